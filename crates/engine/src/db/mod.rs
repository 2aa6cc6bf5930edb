//! Database operations for the printline `PostgreSQL` schema.
//!
//! # Tables
//!
//! - `customers` - Buyers, keyed by email
//! - `products` - Products, keyed by SKU then ShipStation product ID
//! - `orders` / `order_items` - Orders mirrored from ShipStation
//! - `print_tasks` - Manufacturing queue, unique on `(order_item_id, task_index)`
//! - `sync_progress` - One row per sync run, carries the resume checkpoint
//! - `ai_call_logs` - Audit trail of every AI extraction call
//! - `tags` - ShipStation tags
//!
//! # Migrations
//!
//! Migrations live in `crates/engine/migrations/` and are embedded in the
//! binary:
//! ```bash
//! pl-cli migrate
//! ```

pub mod ai_call_logs;
pub mod customers;
pub mod orders;
pub mod print_tasks;
pub mod products;
pub mod store;
pub mod sync_progress;
pub mod tags;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use ai_call_logs::AiCallLogRepository;
pub use customers::CustomerRepository;
pub use orders::OrderRepository;
pub use print_tasks::PrintTaskRepository;
pub use products::ProductRepository;
pub use store::{PgReconciliationStore, PgSyncStore, ReconciliationStore, SyncStore};
pub use sync_progress::SyncProgressRepository;
pub use tags::TagRepository;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique violation to [`RepositoryError::Conflict`], anything else to
/// [`RepositoryError::Database`].
pub(crate) fn map_unique_violation(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let constraint = db_err.constraint().unwrap_or("unknown");
        return RepositoryError::Conflict(format!("{what} ({constraint})"));
    }
    RepositoryError::Database(e)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
