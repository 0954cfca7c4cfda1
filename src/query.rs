//! Question answering over one dataset.
//!
//! Builds a bounded context from the dataset's records, asks the
//! [`InferenceClient`], and appends the exchange to the query log. Failed
//! inference calls are not logged as queries.

use thiserror::Error;
use tracing::{info, warn};

use recordsift_core::context::{build_context, truncate_context};
use recordsift_core::models::{FieldError, NewQueryLog, QueryLog};
use recordsift_core::store::Store;

use crate::inference::InferenceClient;

/// Stored answer when the model returns nothing usable.
pub const NO_ANSWER: &str = "no answer available";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query request is invalid")]
    Validation(Vec<FieldError>),
    #[error("user has no datasets")]
    NoDatasets,
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),
    #[error("inference request failed: {0}")]
    Inference(anyhow::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn required(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Answer `question` from the records of the caller's dataset named
/// `dataset_name` and persist the exchange.
pub async fn ask<S: Store + ?Sized>(
    store: &S,
    inference: &dyn InferenceClient,
    user_id: i64,
    question: Option<&str>,
    dataset_name: Option<&str>,
) -> Result<QueryLog, QueryError> {
    let Some(question) = required(question) else {
        return Err(QueryError::Validation(vec![FieldError::new(
            "question",
            "Question is required",
        )]));
    };
    let Some(dataset_name) = required(dataset_name) else {
        return Err(QueryError::Validation(vec![FieldError::new(
            "datasetName",
            "Dataset name is required",
        )]));
    };

    if !store.has_datasets(user_id).await? {
        return Err(QueryError::NoDatasets);
    }

    let dataset = store
        .find_dataset(user_id, dataset_name)
        .await?
        .ok_or_else(|| QueryError::DatasetNotFound(dataset_name.to_string()))?;
    let records = store.list_records(dataset.id).await?;

    let question = question.trim();
    let content = truncate_context(question, &build_context(&records));

    let answer = match inference.answer(question, &content).await {
        Ok(Some(answer)) => answer,
        Ok(None) => NO_ANSWER.to_string(),
        Err(e) => {
            warn!(user_id, dataset = %dataset.name, error = %e, "inference call failed");
            return Err(QueryError::Inference(e));
        }
    };

    let saved = store
        .insert_query(&NewQueryLog {
            user_id,
            dataset_name: dataset.name.clone(),
            query: question.to_string(),
            content,
            answer,
        })
        .await?;

    info!(user_id, query_id = saved.id, dataset = %saved.dataset_name, "answered query");
    Ok(saved)
}
