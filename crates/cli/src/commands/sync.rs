//! ShipStation order and tag sync commands.
//!
//! # Usage
//!
//! ```bash
//! pl-cli sync full [--since 2024-01-01] [--resume]
//! pl-cli sync recent --days 3
//! pl-cli sync order 123456789
//! pl-cli sync range --start 2024-01-01 --end 2024-01-31
//! pl-cli tags
//! ```
//!
//! Shared flags (`--dry-run`, `--all-statuses`, `--page-limit`) go before the
//! mode.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use printline_engine::config::{ConfigError, EngineConfig};
use printline_engine::db::{self, PgSyncStore};
use printline_engine::services::order_sync::parse_timestamp;
use printline_engine::services::{OrderSyncService, SyncError, SyncMode, SyncOptions};
use printline_engine::shipstation::{ShipStationClient, ShipStationError};

use crate::{SyncCommand, SyncFlags};

/// Errors from the sync commands.
#[derive(Debug, Error)]
pub enum SyncCommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("ShipStation client error: {0}")]
    ShipStation(#[from] ShipStationError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("sync failed: {0}")]
    Failed(String),
}

/// Parse a `YYYY-MM-DD` date (midnight UTC) or a full timestamp.
///
/// # Errors
///
/// Returns a message for clap if neither form matches.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    parse_timestamp(value).ok_or_else(|| {
        format!("'{value}' is not a YYYY-MM-DD date or an RFC 3339 timestamp")
    })
}

/// Run one order sync.
///
/// # Errors
///
/// Returns `SyncCommandError` if setup fails or the run does not complete.
pub async fn run(flags: &SyncFlags, command: SyncCommand) -> Result<(), SyncCommandError> {
    let (config, _guard) = super::init()?;
    let service = build_service(&config, flags).await?;

    let mode = match command {
        SyncCommand::Full { since, resume } => SyncMode::Full { since, resume },
        SyncCommand::Recent { days } => SyncMode::Recent { days },
        SyncCommand::Order {
            shipstation_order_id,
        } => SyncMode::Single {
            shipstation_order_id,
        },
        SyncCommand::Range { start, end } => SyncMode::OrderDateRange { start, end },
    };

    let summary = service.run(mode).await?;
    if summary.is_success() {
        tracing::info!(%summary, "Sync finished");
        Ok(())
    } else {
        tracing::error!(%summary, "Sync failed");
        Err(SyncCommandError::Failed(
            summary.error.unwrap_or_else(|| summary.status.to_string()),
        ))
    }
}

/// Mirror ShipStation tags.
///
/// # Errors
///
/// Returns `SyncCommandError` if setup, the API call or the upsert fails.
pub async fn tags() -> Result<(), SyncCommandError> {
    let (config, _guard) = super::init()?;
    let flags = SyncFlags {
        dry_run: false,
        all_statuses: false,
        page_limit: None,
    };
    let service = build_service(&config, &flags).await?;

    let count = service.sync_tags().await?;
    tracing::info!(count, "Tags synced");
    Ok(())
}

async fn build_service(
    config: &EngineConfig,
    flags: &SyncFlags,
) -> Result<OrderSyncService, SyncCommandError> {
    let pool = db::create_pool(&config.database_url).await?;
    let api = ShipStationClient::new(&config.shipstation)?;
    let options = SyncOptions {
        dry_run: flags.dry_run,
        all_statuses: flags.all_statuses,
        page_limit: flags.page_limit,
        page_delay: config.page_delay,
    };
    Ok(OrderSyncService::new(
        Arc::new(api),
        Arc::new(PgSyncStore::new(pool)),
        options,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_parse_plain_date() {
        assert_eq!(
            parse_date("2024-02-29").unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(
            parse_date("2024-02-29T10:00:00Z").unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_date("last tuesday").is_err());
    }
}
