//! Database operations for print tasks.
//!
//! Tasks are written only through [`upsert`], keyed by
//! `(order_item_id, task_index)`. Linkage columns are set on insert and never
//! touched again.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use printline_core::{CustomerId, OrderId, OrderItemId, PrintTaskId, PrintTaskStatus, ProductId};

use super::RepositoryError;
use crate::models::{PrintTask, TaskUpsert};

const TASK_COLUMNS: &str = r"
    id, order_id, order_item_id, task_index, product_id, customer_id,
    shorthand_product_name, marketplace_order_number, custom_text, color_1, color_2,
    quantity, status, needs_review, review_reason, annotation, ship_by_date,
    created_at, updated_at
";

/// Internal row type for print task queries.
#[derive(Debug, sqlx::FromRow)]
struct PrintTaskRow {
    id: i32,
    order_id: i32,
    order_item_id: i32,
    task_index: i32,
    product_id: i32,
    customer_id: Option<i32>,
    shorthand_product_name: Option<String>,
    marketplace_order_number: Option<String>,
    custom_text: Option<String>,
    color_1: Option<String>,
    color_2: Option<String>,
    quantity: i32,
    status: PrintTaskStatus,
    needs_review: bool,
    review_reason: Option<String>,
    annotation: Option<String>,
    ship_by_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PrintTaskRow> for PrintTask {
    fn from(row: PrintTaskRow) -> Self {
        Self {
            id: PrintTaskId::new(row.id),
            order_id: OrderId::new(row.order_id),
            order_item_id: OrderItemId::new(row.order_item_id),
            task_index: row.task_index,
            product_id: ProductId::new(row.product_id),
            customer_id: row.customer_id.map(CustomerId::new),
            shorthand_product_name: row.shorthand_product_name,
            marketplace_order_number: row.marketplace_order_number,
            custom_text: row.custom_text,
            color_1: row.color_1,
            color_2: row.color_2,
            quantity: row.quantity,
            status: row.status,
            needs_review: row.needs_review,
            review_reason: row.review_reason,
            annotation: row.annotation,
            ship_by_date: row.ship_by_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for print task reads and bulk deletes.
pub struct PrintTaskRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PrintTaskRepository<'a> {
    /// Create a new print task repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All tasks for an order, by item then index.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<PrintTask>, RepositoryError> {
        let rows = sqlx::query_as::<_, PrintTaskRow>(&format!(
            r"
            SELECT {TASK_COLUMNS} FROM printline.print_tasks
            WHERE order_id = $1
            ORDER BY order_item_id, task_index
            "
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete every print task. Callers must confirm with the operator first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query(r"DELETE FROM printline.print_tasks")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Insert a task or refresh its mutable fields.
///
/// Running the same upsert twice leaves one row with identical values.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn upsert(conn: &mut PgConnection, task: &TaskUpsert) -> Result<PrintTask, RepositoryError> {
    let row = sqlx::query_as::<_, PrintTaskRow>(&format!(
        r"
        INSERT INTO printline.print_tasks (
            order_id, order_item_id, task_index, product_id, customer_id,
            shorthand_product_name, marketplace_order_number, custom_text, color_1,
            color_2, quantity, status, needs_review, review_reason, annotation, ship_by_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (order_item_id, task_index) DO UPDATE SET
            custom_text = EXCLUDED.custom_text,
            color_1 = EXCLUDED.color_1,
            color_2 = EXCLUDED.color_2,
            quantity = EXCLUDED.quantity,
            status = EXCLUDED.status,
            needs_review = EXCLUDED.needs_review,
            review_reason = EXCLUDED.review_reason,
            annotation = EXCLUDED.annotation,
            ship_by_date = EXCLUDED.ship_by_date,
            updated_at = NOW()
        RETURNING {TASK_COLUMNS}
        "
    ))
    .bind(task.linkage.order_id)
    .bind(task.order_item_id)
    .bind(task.task_index)
    .bind(task.linkage.product_id)
    .bind(task.linkage.customer_id)
    .bind(&task.linkage.shorthand_product_name)
    .bind(&task.linkage.marketplace_order_number)
    .bind(&task.fields.custom_text)
    .bind(&task.fields.color_1)
    .bind(&task.fields.color_2)
    .bind(task.fields.quantity)
    .bind(task.fields.status)
    .bind(task.fields.needs_review)
    .bind(&task.fields.review_reason)
    .bind(&task.fields.annotation)
    .bind(task.fields.ship_by_date)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into())
}

/// Delete all tasks for one order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn delete_for_order(conn: &mut PgConnection, order_id: OrderId) -> Result<u64, RepositoryError> {
    let result = sqlx::query(r"DELETE FROM printline.print_tasks WHERE order_id = $1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Mark an order's pending and in-progress tasks completed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn complete_open_for_order(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE printline.print_tasks
        SET status = 'completed', updated_at = NOW()
        WHERE order_id = $1 AND status IN ('pending', 'in_progress')
        ",
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
