//! SQLite store tests against a throwaway database file.

use recordsift::config::Config;
use recordsift::sqlite_store::SqliteStore;
use recordsift::{db, migrate};
use recordsift_core::models::{DatasetTarget, NewQueryLog, NewRecord, NewUser};
use recordsift_core::search::search_records;
use recordsift_core::store::{DuplicateEmail, Store};
use serde_json::json;
use tempfile::TempDir;

async fn open(tmp: &TempDir) -> SqliteStore {
    let path = tmp.path().join("data").join("recordsift.sqlite");
    let config = Config::from_toml(&format!(
        "[db]\npath = \"{}\"\n\n[server]\nbind = \"127.0.0.1:0\"\n",
        path.display()
    ))
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    SqliteStore::new(pool)
}

async fn user(store: &SqliteStore, email: &str) -> i64 {
    store
        .create_user(&NewUser {
            name: "Ana".into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
        })
        .await
        .unwrap()
        .id
}

fn record(name: &str, data: serde_json::Value) -> NewRecord {
    NewRecord {
        name: name.into(),
        size: 10,
        data_json: data,
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    migrate::run_migrations(store.pool()).await.unwrap();
    migrate::run_migrations(store.pool()).await.unwrap();
    store.close().await;
}

#[tokio::test]
async fn users_roundtrip_and_email_is_unique() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let id = user(&store, "ana@example.com").await;

    let found = store.find_user_by_email("ana@example.com").await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.password_hash, "$argon2id$stub");
    assert!(store.get_user(id).await.unwrap().is_some());
    assert!(store.get_user(id + 1).await.unwrap().is_none());

    let dup = store
        .create_user(&NewUser {
            name: "Other".into(),
            email: "ana@example.com".into(),
            password_hash: "x".into(),
        })
        .await;
    let err = dup.unwrap_err();
    assert!(err.downcast_ref::<DuplicateEmail>().is_some());
}

#[tokio::test]
async fn batch_creates_dataset_and_records_in_order() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let uid = user(&store, "ana@example.com").await;
    assert!(!store.has_datasets(uid).await.unwrap());

    let (dataset, created) = store
        .insert_batch(
            &DatasetTarget::Create {
                user_id: uid,
                name: "docs".into(),
            },
            &[
                record("a", json!([{"k": "v"}])),
                record("b", json!({"text": "hello"})),
            ],
        )
        .await
        .unwrap();

    assert_eq!(dataset.name, "docs");
    assert_eq!(created.len(), 2);
    assert!(store.has_datasets(uid).await.unwrap());

    let listed = store.list_records(dataset.id).await.unwrap();
    let names: Vec<&str> = listed.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(listed[1].data_json, json!({"text": "hello"}));
    assert_eq!(listed[0].created_at, created[0].created_at);

    let summaries = store.list_datasets(uid).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].record_count, 2);

    let found = store.find_dataset(uid, "docs").await.unwrap().unwrap();
    assert_eq!(found, dataset);
    assert!(store.find_dataset(uid, "Docs").await.unwrap().is_none());
}

#[tokio::test]
async fn existing_names_are_reported() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let uid = user(&store, "ana@example.com").await;
    let (dataset, _) = store
        .insert_batch(
            &DatasetTarget::Create {
                user_id: uid,
                name: "d".into(),
            },
            &[record("a", json!([])), record("b", json!([]))],
        )
        .await
        .unwrap();

    let taken = store
        .existing_record_names(dataset.id, &["b".to_string(), "c".to_string()])
        .await
        .unwrap();
    assert_eq!(taken, vec!["b".to_string()]);
    assert!(store.existing_record_names(dataset.id, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_batch_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let uid = user(&store, "ana@example.com").await;

    // Same name twice violates UNIQUE(dataset_id, name) on the second insert.
    let result = store
        .insert_batch(
            &DatasetTarget::Create {
                user_id: uid,
                name: "d".into(),
            },
            &[record("a", json!([])), record("a", json!([]))],
        )
        .await;
    assert!(result.is_err());
    assert!(store.find_dataset(uid, "d").await.unwrap().is_none());
    assert!(!store.has_datasets(uid).await.unwrap());
}

#[tokio::test]
async fn appending_to_existing_dataset() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let uid = user(&store, "ana@example.com").await;
    let (dataset, _) = store
        .insert_batch(
            &DatasetTarget::Create {
                user_id: uid,
                name: "d".into(),
            },
            &[record("a", json!([]))],
        )
        .await
        .unwrap();

    let (same, created) = store
        .insert_batch(&DatasetTarget::Existing(dataset.clone()), &[record("b", json!([]))])
        .await
        .unwrap();
    assert_eq!(same.id, dataset.id);
    assert_eq!(created[0].dataset_id, dataset.id);
    assert_eq!(store.list_datasets(uid).await.unwrap()[0].record_count, 2);
}

#[tokio::test]
async fn query_log_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let uid = user(&store, "ana@example.com").await;

    let saved = store
        .insert_query(&NewQueryLog {
            user_id: uid,
            dataset_name: "docs".into(),
            query: "q".into(),
            content: "c".into(),
            answer: "a".into(),
        })
        .await
        .unwrap();
    assert!(saved.id > 0);
    assert_eq!(saved.answer, "a");
}

#[tokio::test]
async fn search_over_sqlite_store() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let uid = user(&store, "ana@example.com").await;
    store
        .insert_batch(
            &DatasetTarget::Create {
                user_id: uid,
                name: "d".into(),
            },
            &[record("r", json!({"text": "Invoice 42, invoice 43"}))],
        )
        .await
        .unwrap();

    let matches = search_records(&store, uid, Some("invoice")).await.unwrap();
    let found: Vec<&str> = matches.iter().map(|m| m.matched.as_str()).collect();
    assert_eq!(found, vec!["invoice", "Invoice"]);
}
