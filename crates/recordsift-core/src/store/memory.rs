//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! Uses `Vec`s behind a single `std::sync::RwLock` so that
//! [`Store::insert_batch`] can validate and apply a whole batch under one
//! write guard. Ids are assigned from per-table counters starting at 1.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    Dataset, DatasetSummary, DatasetTarget, NewQueryLog, NewRecord, NewUser, QueryLog, Record,
    User,
};

use super::{DuplicateEmail, Store};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    datasets: Vec<Dataset>,
    records: Vec<Record>,
    queries: Vec<QueryLog>,
    next_user_id: i64,
    next_dataset_id: i64,
    next_record_id: i64,
    next_query_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// In-memory store for testing.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    /// Number of query log rows, for assertions in tests.
    pub fn query_count(&self) -> usize {
        self.read().map(|t| t.queries.len()).unwrap_or(0)
    }

    /// Number of datasets across all users, for assertions in tests.
    pub fn dataset_count(&self) -> usize {
        self.read().map(|t| t.datasets.len()).unwrap_or(0)
    }

    /// Number of records across all datasets, for assertions in tests.
    pub fn record_count(&self) -> usize {
        self.read().map(|t| t.records.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut tables = self.write()?;
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(DuplicateEmail(user.email.clone()).into());
        }
        let created = User {
            id: next_id(&mut tables.next_user_id),
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.read()?.users.iter().find(|u| u.email == email).cloned())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.read()?.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_datasets(&self, user_id: i64) -> Result<Vec<DatasetSummary>> {
        let tables = self.read()?;
        Ok(tables
            .datasets
            .iter()
            .filter(|d| d.user_id == user_id)
            .map(|d| DatasetSummary {
                id: d.id,
                name: d.name.clone(),
                record_count: tables
                    .records
                    .iter()
                    .filter(|r| r.dataset_id == d.id)
                    .count() as i64,
            })
            .collect())
    }

    async fn has_datasets(&self, user_id: i64) -> Result<bool> {
        Ok(self.read()?.datasets.iter().any(|d| d.user_id == user_id))
    }

    async fn find_dataset(&self, user_id: i64, name: &str) -> Result<Option<Dataset>> {
        Ok(self
            .read()?
            .datasets
            .iter()
            .find(|d| d.user_id == user_id && d.name == name)
            .cloned())
    }

    async fn get_dataset(&self, id: i64) -> Result<Option<Dataset>> {
        Ok(self.read()?.datasets.iter().find(|d| d.id == id).cloned())
    }

    async fn existing_record_names(
        &self,
        dataset_id: i64,
        names: &[String],
    ) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .records
            .iter()
            .filter(|r| r.dataset_id == dataset_id && names.contains(&r.name))
            .map(|r| r.name.clone())
            .collect())
    }

    async fn insert_batch(
        &self,
        target: &DatasetTarget,
        records: &[NewRecord],
    ) -> Result<(Dataset, Vec<Record>)> {
        let mut tables = self.write()?;

        // Check every constraint before touching the tables.
        match target {
            DatasetTarget::Existing(dataset) => {
                if !tables.datasets.iter().any(|d| d.id == dataset.id) {
                    bail!("dataset {} does not exist", dataset.id);
                }
                if let Some(clash) = records.iter().find(|nr| {
                    tables
                        .records
                        .iter()
                        .any(|r| r.dataset_id == dataset.id && r.name == nr.name)
                }) {
                    bail!("UNIQUE constraint failed: records.name ({})", clash.name);
                }
            }
            DatasetTarget::Create { user_id, name } => {
                if tables
                    .datasets
                    .iter()
                    .any(|d| d.user_id == *user_id && &d.name == name)
                {
                    bail!("UNIQUE constraint failed: datasets.name ({})", name);
                }
            }
        }
        for (i, nr) in records.iter().enumerate() {
            if records[..i].iter().any(|prev| prev.name == nr.name) {
                bail!("UNIQUE constraint failed: records.name ({})", nr.name);
            }
        }

        let dataset = match target {
            DatasetTarget::Existing(dataset) => dataset.clone(),
            DatasetTarget::Create { user_id, name } => {
                let dataset = Dataset {
                    id: next_id(&mut tables.next_dataset_id),
                    name: name.clone(),
                    user_id: *user_id,
                };
                tables.datasets.push(dataset.clone());
                dataset
            }
        };

        let now = Utc::now();
        let mut created = Vec::with_capacity(records.len());
        for nr in records {
            let record = Record {
                id: next_id(&mut tables.next_record_id),
                name: nr.name.clone(),
                size: nr.size,
                data_json: nr.data_json.clone(),
                dataset_id: dataset.id,
                created_at: now,
            };
            tables.records.push(record.clone());
            created.push(record);
        }

        Ok((dataset, created))
    }

    async fn list_records(&self, dataset_id: i64) -> Result<Vec<Record>> {
        Ok(self
            .read()?
            .records
            .iter()
            .filter(|r| r.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    async fn insert_query(&self, query: &NewQueryLog) -> Result<QueryLog> {
        let mut tables = self.write()?;
        let row = QueryLog {
            id: next_id(&mut tables.next_query_id),
            user_id: query.user_id,
            dataset_name: query.dataset_name.clone(),
            query: query.query.clone(),
            content: query.content.clone(),
            answer: query.answer.clone(),
            created_at: Utc::now(),
        };
        tables.queries.push(row.clone());
        Ok(row)
    }
}
