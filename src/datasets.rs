//! Dataset and record listings, scoped to the requesting user.

use thiserror::Error;

use recordsift_core::models::{DatasetSummary, RecordSummary};
use recordsift_core::store::Store;

#[derive(Debug, Error)]
pub enum DatasetError {
    /// Missing, or owned by someone else. The two are indistinguishable.
    #[error("dataset not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub async fn list_datasets<S: Store + ?Sized>(
    store: &S,
    user_id: i64,
) -> anyhow::Result<Vec<DatasetSummary>> {
    store.list_datasets(user_id).await
}

/// Records of one of the user's datasets, newest first. Content is
/// included only when `verbose` is set.
pub async fn list_records<S: Store + ?Sized>(
    store: &S,
    user_id: i64,
    dataset_id: i64,
    verbose: bool,
) -> Result<Vec<RecordSummary>, DatasetError> {
    let dataset = store
        .get_dataset(dataset_id)
        .await?
        .filter(|d| d.user_id == user_id)
        .ok_or(DatasetError::NotFound)?;

    let mut records = store.list_records(dataset.id).await?;
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    Ok(records
        .iter()
        .map(|r| RecordSummary::from_record(r, verbose))
        .collect())
}
