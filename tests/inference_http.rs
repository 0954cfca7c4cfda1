//! HTTP behavior of the inference client against a mock endpoint.

use recordsift::config::InferenceConfig;
use recordsift::inference::{HttpInferenceClient, InferenceClient};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, key_env: &str) -> HttpInferenceClient {
    let config = InferenceConfig {
        url: format!("{}/qa", server.uri()),
        api_key_env: key_env.to_string(),
        timeout_secs: Some(5),
    };
    HttpInferenceClient::new(&config).unwrap()
}

#[tokio::test]
async fn posts_question_and_context_with_bearer_key() {
    let server = MockServer::start().await;
    std::env::set_var("RECORDSIFT_TEST_QA_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/qa"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_json(json!({
            "inputs": {"question": "Who?", "context": "Ana wrote it"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "Ana"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "RECORDSIFT_TEST_QA_KEY");
    let answer = client.answer("Who?", "Ana wrote it").await.unwrap();
    assert_eq!(answer.as_deref(), Some("Ana"));
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/qa"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let client = client_for(&server, "RECORDSIFT_TEST_UNSET_KEY");
    let err = client.answer("q", "c").await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn non_json_success_body_has_no_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/qa"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("loading"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, "RECORDSIFT_TEST_UNSET_KEY");
    assert_eq!(client.answer("q", "c").await.unwrap(), None);
}

#[tokio::test]
async fn array_reply_uses_first_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/qa"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"answer": "first"}, {"answer": "second"}])),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, "RECORDSIFT_TEST_UNSET_KEY");
    assert_eq!(
        client.answer("q", "c").await.unwrap().as_deref(),
        Some("first")
    );
}
