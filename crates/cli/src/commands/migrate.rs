//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! pl-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `PRINTLINE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! Migration files live in `crates/engine/migrations/` and are embedded in the
//! binary.

use thiserror::Error;

use printline_engine::config::{self, ConfigError};
use printline_engine::db::{self, MIGRATOR};
use printline_engine::telemetry;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run all pending migrations.
///
/// # Errors
///
/// Returns `MigrationError` if the database is unreachable or a migration
/// fails.
pub async fn run() -> Result<(), MigrationError> {
    telemetry::init_logging_only();
    let database_url = config::database_url_from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete");
    Ok(())
}
