//! Storage abstraction for recordsift.
//!
//! The [`Store`] trait defines every persistence operation the pipelines
//! and the HTTP layer need, so the same logic runs over SQLite in the
//! service and over [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. Each
//! method is atomic on its own; [`Store::insert_batch`] is the only
//! multi-row write and must apply all-or-nothing.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Dataset, DatasetSummary, DatasetTarget, NewQueryLog, NewRecord, NewUser, QueryLog, Record,
    User,
};

/// Error carried by [`Store::create_user`] when the email is already taken.
/// Callers find it with `anyhow::Error::downcast_ref`.
#[derive(Debug, Error)]
#[error("email already registered: {0}")]
pub struct DuplicateEmail(pub String);

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_user`](Store::create_user) | Insert a user (email unique) |
/// | [`find_user_by_email`](Store::find_user_by_email) | Look up a user for login |
/// | [`get_user`](Store::get_user) | Look up a user by id |
/// | [`list_datasets`](Store::list_datasets) | A user's datasets with record counts |
/// | [`has_datasets`](Store::has_datasets) | Whether a user owns any dataset |
/// | [`find_dataset`](Store::find_dataset) | A user's dataset by exact name |
/// | [`get_dataset`](Store::get_dataset) | A dataset by id (no ownership filter) |
/// | [`existing_record_names`](Store::existing_record_names) | Which names are taken in a dataset |
/// | [`insert_batch`](Store::insert_batch) | Create dataset (if needed) and records atomically |
/// | [`list_records`](Store::list_records) | All records of a dataset, insertion order |
/// | [`insert_query`](Store::insert_query) | Append a question-answering log row |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a user. Fails with [`DuplicateEmail`] if the email is already
    /// registered.
    async fn create_user(&self, user: &NewUser) -> Result<User>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_user(&self, id: i64) -> Result<Option<User>>;

    /// All datasets owned by `user_id`, in storage order.
    async fn list_datasets(&self, user_id: i64) -> Result<Vec<DatasetSummary>>;

    async fn has_datasets(&self, user_id: i64) -> Result<bool>;

    async fn find_dataset(&self, user_id: i64, name: &str) -> Result<Option<Dataset>>;

    async fn get_dataset(&self, id: i64) -> Result<Option<Dataset>>;

    /// The subset of `names` already used by records in `dataset_id`.
    async fn existing_record_names(&self, dataset_id: i64, names: &[String])
        -> Result<Vec<String>>;

    /// Persist one ingestion batch: create the dataset when `target` asks
    /// for it, then one record per entry of `records`, in order. Nothing is
    /// kept if any step fails.
    async fn insert_batch(
        &self,
        target: &DatasetTarget,
        records: &[NewRecord],
    ) -> Result<(Dataset, Vec<Record>)>;

    /// All records of a dataset in insertion order.
    async fn list_records(&self, dataset_id: i64) -> Result<Vec<Record>>;

    async fn insert_query(&self, query: &NewQueryLog) -> Result<QueryLog>;
}
