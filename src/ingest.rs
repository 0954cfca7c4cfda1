//! Upload ingestion pipeline.
//!
//! Turns one upload request into a dataset plus one record per file:
//!
//! 1. Shape checks ([`validate_upload`]): files, dataset name, record names,
//!    one name per file, no duplicates.
//! 2. If the dataset already exists, reject names already used in it.
//! 3. Reject any file whose content type has no parser.
//! 4. Parse every file on the blocking pool. Results keep input order.
//! 5. Persist the dataset (when new) and all records in one
//!    [`Store::insert_batch`] call.
//!
//! Nothing is written before step 5, so a failure at any step leaves the
//! store untouched.

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, info};

use recordsift_core::models::{Dataset, DatasetTarget, FieldError, NewRecord, Record};
use recordsift_core::store::Store;
use recordsift_core::validate::{validate_upload, RecordNames};

use crate::extract::{self, ExtractError};

/// One file as delivered by the upload transport.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// The non-file parts of an upload request, as received.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub dataset_name: Option<String>,
    pub record_names: Option<RecordNames>,
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("upload request is invalid")]
    Validation(Vec<FieldError>),
    #[error("record names already exist in this dataset")]
    Conflict(Vec<FieldError>),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ExtractError,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Run the whole pipeline for `user_id`. Returns the target dataset and the
/// records created for it, in file order.
pub async fn ingest_upload<S: Store + ?Sized>(
    store: &S,
    user_id: i64,
    request: UploadRequest,
) -> Result<(Dataset, Vec<Record>), IngestError> {
    let UploadRequest {
        dataset_name,
        record_names,
        files,
    } = request;

    let plan = validate_upload(files.len(), dataset_name.as_deref(), record_names)
        .map_err(IngestError::Validation)?;

    let existing = store.find_dataset(user_id, &plan.dataset_name).await?;
    if let Some(dataset) = &existing {
        let taken = store
            .existing_record_names(dataset.id, &plan.record_names)
            .await?;
        if !taken.is_empty() {
            return Err(IngestError::Conflict(
                taken
                    .iter()
                    .map(|name| {
                        FieldError::new(
                            "recordName",
                            format!("Record with name \"{}\" already exists in this dataset.", name),
                        )
                    })
                    .collect(),
            ));
        }
    }

    if let Some(file) = files.iter().find(|f| !extract::is_supported(&f.content_type)) {
        return Err(IngestError::UnsupportedFormat(file.content_type.clone()));
    }

    let parsed = try_join_all(files.into_iter().map(parse_uploaded)).await?;

    let records: Vec<NewRecord> = plan
        .record_names
        .iter()
        .zip(parsed)
        .map(|(name, (size, data_json))| NewRecord {
            name: name.clone(),
            size,
            data_json,
        })
        .collect();

    let target = match existing {
        Some(dataset) => DatasetTarget::Existing(dataset),
        None => DatasetTarget::Create {
            user_id,
            name: plan.dataset_name.clone(),
        },
    };

    let (dataset, created) = store.insert_batch(&target, &records).await?;
    info!(
        user_id,
        dataset_id = dataset.id,
        dataset = %dataset.name,
        records = created.len(),
        "ingested upload"
    );

    Ok((dataset, created))
}

async fn parse_uploaded(file: UploadedFile) -> Result<(i64, serde_json::Value), IngestError> {
    let file_name = file.file_name.clone();
    let size = file.bytes.len() as i64;
    debug!(file = %file_name, size, content_type = %file.content_type, "parsing upload");

    let data = tokio::task::spawn_blocking(move || {
        extract::parse_file(&file.bytes, &file.content_type)
    })
    .await
    .map_err(|e| anyhow::anyhow!("parser task failed: {}", e))?
    .map_err(|source| IngestError::Parse {
        file: file_name,
        source,
    })?;

    Ok((size, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordsift_core::store::memory::InMemoryStore;
    use serde_json::json;

    fn csv(name: &str, body: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: extract::MIME_CSV.to_string(),
            bytes: body.as_bytes().to_vec(),
        }
    }

    fn request(dataset: &str, names: &str, files: Vec<UploadedFile>) -> UploadRequest {
        UploadRequest {
            dataset_name: Some(dataset.to_string()),
            record_names: Some(RecordNames::Delimited(names.to_string())),
            files,
        }
    }

    #[tokio::test]
    async fn csv_into_new_dataset() {
        let store = InMemoryStore::new();
        let body = "city,pop\nRecife,1500000\n";
        let (dataset, records) = ingest_upload(&store, 1, request("cities", "br", vec![csv("a.csv", body)]))
            .await
            .unwrap();

        assert_eq!(dataset.name, "cities");
        assert_eq!(dataset.user_id, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "br");
        assert_eq!(records[0].size, body.len() as i64);
        assert_eq!(records[0].data_json, json!([{"city": "Recife", "pop": "1500000"}]));
        assert_eq!(store.dataset_count(), 1);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn records_follow_file_order() {
        let store = InMemoryStore::new();
        let files = vec![csv("1.csv", "n\none\n"), csv("2.csv", "n\ntwo\n"), csv("3.csv", "n\nthree\n")];
        let (_, records) = ingest_upload(&store, 1, request("d", "first, second ,third", files))
            .await
            .unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(records[2].data_json, json!([{"n": "three"}]));
    }

    #[tokio::test]
    async fn duplicate_names_in_request_create_nothing() {
        let store = InMemoryStore::new();
        let files = vec![csv("a.csv", "x\n1\n"), csv("b.csv", "x\n2\n")];
        let err = ingest_upload(&store, 1, request("d", "file1, file1", files))
            .await
            .unwrap_err();

        match err {
            IngestError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "recordName");
                assert!(errors[0].message.contains("file1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.dataset_count(), 0);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn name_count_mismatch_rejected() {
        let store = InMemoryStore::new();
        let err = ingest_upload(&store, 1, request("d", "only", vec![csv("a.csv", "x\n"), csv("b.csv", "x\n")]))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(ref e) if e[0].field == "recordNames"));
    }

    #[tokio::test]
    async fn existing_names_conflict() {
        let store = InMemoryStore::new();
        ingest_upload(&store, 1, request("d", "a", vec![csv("a.csv", "x\n1\n")]))
            .await
            .unwrap();

        let err = ingest_upload(&store, 1, request("d", "a, b", vec![csv("a.csv", "x\n1\n"), csv("b.csv", "x\n2\n")]))
            .await
            .unwrap_err();
        match err {
            IngestError::Conflict(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].message, "Record with name \"a\" already exists in this dataset.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn appends_to_existing_dataset() {
        let store = InMemoryStore::new();
        let (first, _) = ingest_upload(&store, 1, request("d", "a", vec![csv("a.csv", "x\n1\n")]))
            .await
            .unwrap();
        let (second, records) = ingest_upload(&store, 1, request("d", "b", vec![csv("b.csv", "x\n2\n")]))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(records[0].dataset_id, first.id);
        assert_eq!(store.dataset_count(), 1);
        assert_eq!(store.record_count(), 2);
    }

    #[tokio::test]
    async fn same_dataset_name_is_per_user() {
        let store = InMemoryStore::new();
        let (a, _) = ingest_upload(&store, 1, request("d", "a", vec![csv("a.csv", "x\n1\n")]))
            .await
            .unwrap();
        let (b, _) = ingest_upload(&store, 2, request("d", "a", vec![csv("a.csv", "x\n1\n")]))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.dataset_count(), 2);
    }

    #[tokio::test]
    async fn unsupported_format_leaves_store_untouched() {
        let store = InMemoryStore::new();
        let png = UploadedFile {
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0x89, 0x50],
        };
        let err = ingest_upload(&store, 1, request("d", "a, b", vec![csv("a.csv", "x\n1\n"), png]))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::UnsupportedFormat(ref ct) if ct == "image/png"));
        assert_eq!(store.dataset_count(), 0);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn unparsable_pdf_leaves_store_untouched() {
        let store = InMemoryStore::new();
        let pdf = UploadedFile {
            file_name: "bad.pdf".to_string(),
            content_type: extract::MIME_PDF.to_string(),
            bytes: b"not a pdf".to_vec(),
        };
        let err = ingest_upload(&store, 1, request("d", "a, b", vec![csv("a.csv", "x\n1\n"), pdf]))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Parse { ref file, .. } if file == "bad.pdf"));
        assert_eq!(store.dataset_count(), 0);
    }

    #[tokio::test]
    async fn missing_dataset_name_rejected_before_store_access() {
        let store = InMemoryStore::new();
        let req = UploadRequest {
            dataset_name: None,
            record_names: Some(RecordNames::Delimited("a".into())),
            files: vec![csv("a.csv", "x\n")],
        };
        let err = ingest_upload(&store, 1, req).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(ref e) if e[0].field == "datasetName"));
    }
}
