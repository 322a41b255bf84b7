//! Persistence for users and journal entries.
//!
//! Handlers and jobs talk to the `LedgerStore` trait. Two backends exist:
//! `PgStore` for PostgreSQL deployments and `MemoryStore` for running without
//! a database and for tests. Aggregation (ledgers, reports) happens in
//! `accounting` over the entries returned here, so backends only filter.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{DateRange, JournalEntry, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("User already exists: {0}")]
    DuplicateUser(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_user(&self, line_user_id: &str) -> Result<Option<User>, StoreError>;

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn insert_entry(&self, entry: &JournalEntry) -> Result<(), StoreError>;

    /// Entries of one user within `range`, oldest first (ties by creation time).
    async fn entries_for_user(
        &self,
        user_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<JournalEntry>, StoreError>;

    /// Delete an entry owned by `user_id`. Returns false when nothing matched.
    async fn delete_entry(&self, user_id: Uuid, entry_id: Uuid) -> Result<bool, StoreError>;

    /// Cheap connectivity check for health probes
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;
}

/// Open the configured store: PostgreSQL when a URL is set, memory otherwise.
pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn LedgerStore>, StoreError> {
    match &config.url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections).await?;
            store.create_schema().await?;
            tracing::info!(max_connections = config.max_connections, "Connected to PostgreSQL");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("No database configured, journal entries are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
