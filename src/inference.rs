//! External question-answering client.
//!
//! The service forwards `{question, context}` to an extractive QA model
//! hosted behind an HTTP endpoint:
//!
//! ```json
//! POST <inference.url>
//! Authorization: Bearer <key>
//! { "inputs": { "question": "...", "context": "..." } }
//! ```
//!
//! A 2xx response carries `{"answer": "..."}` (some deployments wrap it in a
//! one-element array). A 2xx body that is not JSON, or has no usable answer,
//! yields `None`. Transport failures and non-2xx statuses are errors. There
//! is exactly one attempt per call.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::InferenceConfig;

/// Anything that can answer a question from a context string.
///
/// `Ok(None)` means the service replied successfully but carried no usable
/// answer; transport and non-2xx failures are `Err`.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn answer(&self, question: &str, context: &str) -> Result<Option<String>>;
}

/// [`InferenceClient`] over HTTP using `reqwest`.
pub struct HttpInferenceClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpInferenceClient {
    /// Build a client from configuration. The API key is read from the
    /// environment variable named by `api_key_env`; when unset, requests
    /// go out without an `Authorization` header.
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "inference API key not set; requests will be unauthenticated"
            );
        }

        Ok(Self {
            client: builder.build()?,
            url: config.url.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn answer(&self, question: &str, context: &str) -> Result<Option<String>> {
        let body = serde_json::json!({
            "inputs": {
                "question": question,
                "context": context,
            }
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("inference API error {}: {}", status, body_text);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str::<Value>(&text)
            .ok()
            .as_ref()
            .and_then(extract_answer))
    }
}

/// Pull a non-empty `answer` string out of an inference response.
pub fn extract_answer(json: &Value) -> Option<String> {
    let object = match json {
        Value::Array(items) => items.first()?,
        other => other,
    };
    object
        .get("answer")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}
