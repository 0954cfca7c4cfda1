//! Operator commands: `recordsift search` and `recordsift datasets`.
//!
//! Both open the configured database directly and print pretty JSON to
//! stdout, in the same shapes the HTTP API returns.

use anyhow::Result;

use recordsift_core::search::search_records;

use crate::config::Config;
use crate::datasets;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Run a pattern search over the records of `user_id` and print
/// `{"matches": [...]}`.
pub async fn run_search(config: &Config, user_id: i64, query: &str) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let result = search_records(&store, user_id, Some(query)).await;
    store.close().await;

    let matches = result?;
    if matches.is_empty() {
        tracing::info!(user_id, query, "no matches");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "matches": matches }))?
    );
    Ok(())
}

/// Print the datasets owned by `user_id` with their record counts.
pub async fn run_list_datasets(config: &Config, user_id: i64) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let result = datasets::list_datasets(&store, user_id).await;
    store.close().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}
