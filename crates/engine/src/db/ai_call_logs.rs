//! Database operations for the AI call audit log.

use sqlx::PgPool;

use printline_core::AiCallLogId;

use super::RepositoryError;
use crate::models::NewAiCallLog;

/// Repository for AI call log rows.
pub struct AiCallLogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AiCallLogRepository<'a> {
    /// Create a new AI call log repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append one call record.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert(&self, log: &NewAiCallLog) -> Result<AiCallLogId, RepositoryError> {
        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO printline.ai_call_logs (
                script_name, order_id, order_number, marketplace, ai_provider, model_used,
                prompt_sent, raw_response, processing_time_ms, success, error_message,
                tasks_generated, needs_review_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            ",
        )
        .bind(&log.script_name)
        .bind(log.order_id)
        .bind(&log.order_number)
        .bind(&log.marketplace)
        .bind(&log.ai_provider)
        .bind(&log.model_used)
        .bind(&log.prompt_sent)
        .bind(&log.raw_response)
        .bind(log.processing_time_ms)
        .bind(log.success)
        .bind(&log.error_message)
        .bind(log.tasks_generated)
        .bind(log.needs_review_count)
        .fetch_one(self.pool)
        .await?;

        Ok(AiCallLogId::new(id))
    }
}
