//! Database operations for ShipStation tags.

use sqlx::PgPool;

use super::RepositoryError;
use crate::models::TagRecord;

/// Repository for tag rows.
pub struct TagRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TagRepository<'a> {
    /// Create a new tag repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Upsert tags by ShipStation tag ID in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails; nothing is
    /// written in that case.
    pub async fn upsert_all(&self, tags: &[TagRecord]) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for tag in tags {
            let result = sqlx::query(
                r"
                INSERT INTO printline.tags (shipstation_tag_id, name, color_hex, last_synced)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (shipstation_tag_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    color_hex = EXCLUDED.color_hex,
                    last_synced = NOW()
                ",
            )
            .bind(tag.shipstation_tag_id)
            .bind(&tag.name)
            .bind(&tag.color_hex)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }
}
