//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`migrate::run_migrations`](crate::migrate::run_migrations). Record data
//! is kept as JSON text, timestamps as unix milliseconds.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use recordsift_core::models::{
    Dataset, DatasetSummary, DatasetTarget, NewQueryLog, NewRecord, NewUser, QueryLog, Record,
    User,
};
use recordsift_core::store::{DuplicateEmail, Store};

/// SQLite implementation of the [`Store`] trait.
///
/// Wraps a [`SqlitePool`]. [`Store::insert_batch`] runs inside a single
/// transaction; every other method is one statement.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the underlying pool, waiting for in-flight connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
    }
}

fn dataset_from_row(row: &SqliteRow) -> Dataset {
    Dataset {
        id: row.get("id"),
        name: row.get("name"),
        user_id: row.get("user_id"),
    }
}

fn record_from_row(row: &SqliteRow) -> Result<Record> {
    let data_json: String = row.get("data_json");
    Ok(Record {
        id: row.get("id"),
        name: row.get("name"),
        size: row.get("size"),
        data_json: serde_json::from_str(&data_json)?,
        dataset_id: row.get("dataset_id"),
        created_at: from_millis(row.get("created_at")),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let result = sqlx::query("INSERT INTO users (name, email, password_hash) VALUES (?, ?, ?)")
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => {
                    anyhow::Error::new(DuplicateEmail(user.email.clone()))
                }
                _ => anyhow::Error::new(e),
            })?;

        Ok(User {
            id: result.last_insert_rowid(),
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, password_hash FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, password_hash FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn list_datasets(&self, user_id: i64) -> Result<Vec<DatasetSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.name, COUNT(r.id) AS record_count
            FROM datasets d
            LEFT JOIN records r ON r.dataset_id = d.id
            WHERE d.user_id = ?
            GROUP BY d.id, d.name
            ORDER BY d.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DatasetSummary {
                id: row.get("id"),
                name: row.get("name"),
                record_count: row.get("record_count"),
            })
            .collect())
    }

    async fn has_datasets(&self, user_id: i64) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM datasets WHERE user_id = ?)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_dataset(&self, user_id: i64, name: &str) -> Result<Option<Dataset>> {
        let row = sqlx::query("SELECT id, name, user_id FROM datasets WHERE user_id = ? AND name = ?")
            .bind(user_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(dataset_from_row))
    }

    async fn get_dataset(&self, id: i64) -> Result<Option<Dataset>> {
        let row = sqlx::query("SELECT id, name, user_id FROM datasets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(dataset_from_row))
    }

    async fn existing_record_names(
        &self,
        dataset_id: i64,
        names: &[String],
    ) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "SELECT name FROM records WHERE dataset_id = ? AND name IN ({}) ORDER BY id ASC",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(dataset_id);
        for name in names {
            query = query.bind(name);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn insert_batch(
        &self,
        target: &DatasetTarget,
        records: &[NewRecord],
    ) -> Result<(Dataset, Vec<Record>)> {
        let mut tx = self.pool.begin().await?;

        let dataset = match target {
            DatasetTarget::Existing(dataset) => dataset.clone(),
            DatasetTarget::Create { user_id, name } => {
                let result = sqlx::query("INSERT INTO datasets (name, user_id) VALUES (?, ?)")
                    .bind(name)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                Dataset {
                    id: result.last_insert_rowid(),
                    name: name.clone(),
                    user_id: *user_id,
                }
            }
        };

        let created_ms = Utc::now().timestamp_millis();
        let mut created = Vec::with_capacity(records.len());

        for record in records {
            let data_json = serde_json::to_string(&record.data_json)?;
            let result = sqlx::query(
                r#"
                INSERT INTO records (name, size, data_json, dataset_id, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.name)
            .bind(record.size)
            .bind(&data_json)
            .bind(dataset.id)
            .bind(created_ms)
            .execute(&mut *tx)
            .await?;

            created.push(Record {
                id: result.last_insert_rowid(),
                name: record.name.clone(),
                size: record.size,
                data_json: record.data_json.clone(),
                dataset_id: dataset.id,
                created_at: from_millis(created_ms),
            });
        }

        tx.commit().await?;
        Ok((dataset, created))
    }

    async fn list_records(&self, dataset_id: i64) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, size, data_json, dataset_id, created_at
            FROM records
            WHERE dataset_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn insert_query(&self, query: &NewQueryLog) -> Result<QueryLog> {
        let created_ms = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO queries (user_id, dataset_name, query, content, answer, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(query.user_id)
        .bind(&query.dataset_name)
        .bind(&query.query)
        .bind(&query.content)
        .bind(&query.answer)
        .bind(created_ms)
        .execute(&self.pool)
        .await?;

        Ok(QueryLog {
            id: result.last_insert_rowid(),
            user_id: query.user_id,
            dataset_name: query.dataset_name.clone(),
            query: query.query.clone(),
            content: query.content.clone(),
            answer: query.answer.clone(),
            created_at: from_millis(created_ms),
        })
    }
}
