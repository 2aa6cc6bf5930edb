//! Database operations for sync run progress.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use printline_core::{SyncProgressId, SyncStatus, SyncType};

use super::RepositoryError;
use crate::models::{OrderCheckpoint, SyncProgress};

const PROGRESS_COLUMNS: &str = r"
    id, sync_type, status, started_at, ended_at, total_orders, processed_orders,
    failed_orders, last_processed_order_id, last_processed_timestamp, error
";

#[derive(Debug, sqlx::FromRow)]
struct SyncProgressRow {
    id: i32,
    sync_type: SyncType,
    status: SyncStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    total_orders: i32,
    processed_orders: i32,
    failed_orders: i32,
    last_processed_order_id: Option<i64>,
    last_processed_timestamp: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl From<SyncProgressRow> for SyncProgress {
    fn from(row: SyncProgressRow) -> Self {
        Self {
            id: SyncProgressId::new(row.id),
            sync_type: row.sync_type,
            status: row.status,
            started_at: row.started_at,
            ended_at: row.ended_at,
            total_orders: row.total_orders,
            processed_orders: row.processed_orders,
            failed_orders: row.failed_orders,
            last_processed_order_id: row.last_processed_order_id,
            last_processed_timestamp: row.last_processed_timestamp,
            error: row.error,
        }
    }
}

/// Repository for sync progress rows.
pub struct SyncProgressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SyncProgressRepository<'a> {
    /// Create a new sync progress repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Start a new run.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn start(&self, sync_type: SyncType) -> Result<SyncProgress, RepositoryError> {
        let row = sqlx::query_as::<_, SyncProgressRow>(&format!(
            r"
            INSERT INTO printline.sync_progress (sync_type, status)
            VALUES ($1, 'running')
            RETURNING {PROGRESS_COLUMNS}
            "
        ))
        .bind(sync_type)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Start a new run that continues the most recent failed run of the same
    /// type, copying its counters and checkpoint.
    ///
    /// Returns `None` when there is no failed run with a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn resume_failed(
        &self,
        sync_type: SyncType,
    ) -> Result<Option<SyncProgress>, RepositoryError> {
        let row = sqlx::query_as::<_, SyncProgressRow>(&format!(
            r"
            INSERT INTO printline.sync_progress (
                sync_type, status, total_orders, processed_orders, failed_orders,
                last_processed_order_id, last_processed_timestamp
            )
            SELECT sync_type, 'running', total_orders, processed_orders, failed_orders,
                   last_processed_order_id, last_processed_timestamp
            FROM printline.sync_progress
            WHERE sync_type = $1 AND status = 'failed' AND last_processed_order_id IS NOT NULL
            ORDER BY ended_at DESC NULLS LAST
            LIMIT 1
            RETURNING {PROGRESS_COLUMNS}
            "
        ))
        .bind(sync_type)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Record the total reported by the first page.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_total(&self, id: SyncProgressId, total: i32) -> Result<(), RepositoryError> {
        sqlx::query(r"UPDATE printline.sync_progress SET total_orders = $2 WHERE id = $1")
            .bind(id)
            .bind(total)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Bump a counter and move the checkpoint to the given order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn record_order(
        &self,
        id: SyncProgressId,
        checkpoint: &OrderCheckpoint,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE printline.sync_progress SET
                processed_orders = processed_orders + CASE WHEN $2 THEN 1 ELSE 0 END,
                failed_orders = failed_orders + CASE WHEN $2 THEN 0 ELSE 1 END,
                last_processed_order_id = $3,
                last_processed_timestamp = COALESCE($4, last_processed_timestamp)
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(checkpoint.succeeded)
        .bind(checkpoint.shipstation_order_id)
        .bind(checkpoint.modified_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Close a run as completed or failed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn finish(
        &self,
        id: SyncProgressId,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE printline.sync_progress
            SET status = $2, ended_at = NOW(), error = $3
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}
