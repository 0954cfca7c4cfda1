//! Core data models shared by the store, the pipelines, and the HTTP layer.
//!
//! Serialized shapes use camelCase keys (`createdAt`, `dataJson`,
//! `recordCount`), matching the JSON API.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered account. Deliberately not `Serialize`: the password hash
/// must never reach a response body. Use [`UserProfile`] instead.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Public view of a [`User`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// A named collection of records owned by one user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
}

/// Dataset listing entry with its record count.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: i64,
    pub name: String,
    pub record_count: i64,
}

/// One ingested file: parsed content plus metadata.
///
/// `data_json` is an array of row objects for CSV input and `{"text": ...}`
/// for PDF input. It is fixed at creation and never rewritten.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: i64,
    pub name: String,
    pub size: i64,
    pub data_json: serde_json::Value,
    pub dataset_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Record metadata without content, as returned by uploads and listings.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: i64,
    pub name: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_json: Option<serde_json::Value>,
}

impl RecordSummary {
    /// Summarize a record, keeping its content only when `verbose` is set.
    pub fn from_record(record: &Record, verbose: bool) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            size: record.size,
            created_at: record.created_at,
            data_json: verbose.then(|| record.data_json.clone()),
        }
    }
}

/// A parsed file ready to be persisted into a dataset.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub name: String,
    pub size: i64,
    pub data_json: serde_json::Value,
}

/// Where an ingestion batch lands: a dataset found earlier in the same
/// request, or one to be created together with the records.
#[derive(Debug, Clone)]
pub enum DatasetTarget {
    Existing(Dataset),
    Create { user_id: i64, name: String },
}

/// Append-only log row for one question-answering exchange.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryLog {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub dataset_name: String,
    pub query: String,
    pub content: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a [`QueryLog`] row.
#[derive(Debug, Clone)]
pub struct NewQueryLog {
    pub user_id: i64,
    pub dataset_name: String,
    pub query: String,
    pub content: String,
    pub answer: String,
}

/// One validation violation, reported as `{"field": ..., "message": ...}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
