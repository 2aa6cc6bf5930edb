//! Storage seams used by the services.
//!
//! The reconciliation orchestrator and the order sync service talk to the
//! database only through these traits, so tests can run them against
//! in-memory fakes. The `Pg*` implementations compose the repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgPool};

use printline_core::{OrderId, OrderStatus, SyncProgressId, SyncStatus, SyncType};

use super::{
    AiCallLogRepository, CustomerRepository, OrderRepository, PrintTaskRepository,
    RepositoryError, SyncProgressRepository, TagRepository, orders, print_tasks, products,
};
use crate::models::{
    Customer, ItemSyncError, NewAiCallLog, NewCustomer, NewOrderItem, OrderCheckpoint,
    OrderUpsert, OrderUpsertReport, OrderWithItems, PersistOutcome, PrintTask, SyncProgress,
    TagRecord, TaskUpsert,
};

/// Storage used by the reconciliation orchestrator.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Order by local ID.
    async fn find_order(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError>;

    /// Most recent order with this marketplace order number.
    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError>;

    /// Order by ShipStation order ID.
    async fn find_order_by_shipstation_id(
        &self,
        shipstation_order_id: i64,
    ) -> Result<Option<OrderWithItems>, RepositoryError>;

    /// Orders awaiting shipment that still need tasks (or all of them when
    /// `include_with_tasks` is set), newest first.
    async fn orders_for_processing(
        &self,
        limit: Option<u32>,
        include_with_tasks: bool,
    ) -> Result<Vec<OrderWithItems>, RepositoryError>;

    /// Existing tasks for an order.
    async fn tasks_for_order(&self, order_id: OrderId) -> Result<Vec<PrintTask>, RepositoryError>;

    /// Write an order's tasks in one transaction.
    ///
    /// With `replace_existing`, every task of the order is deleted first in
    /// the same transaction. Any failure rolls back the whole call.
    async fn persist_order_tasks(
        &self,
        order_id: OrderId,
        tasks: &[TaskUpsert],
        replace_existing: bool,
    ) -> Result<PersistOutcome, RepositoryError>;

    /// Delete every task in the queue.
    async fn delete_all_tasks(&self) -> Result<u64, RepositoryError>;

    /// Append an AI call to the audit log.
    async fn record_ai_call(&self, log: &NewAiCallLog) -> Result<(), RepositoryError>;
}

/// Storage used by the order sync service.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Latest ShipStation `modifyDate` stored locally.
    async fn latest_order_modification(&self) -> Result<Option<DateTime<Utc>>, RepositoryError>;

    async fn start_progress(&self, sync_type: SyncType) -> Result<SyncProgress, RepositoryError>;

    /// Reopen the last failed run of this type from its checkpoint.
    async fn resume_failed_progress(
        &self,
        sync_type: SyncType,
    ) -> Result<Option<SyncProgress>, RepositoryError>;

    async fn set_progress_total(&self, id: SyncProgressId, total: i32) -> Result<(), RepositoryError>;

    async fn record_order_outcome(
        &self,
        id: SyncProgressId,
        checkpoint: &OrderCheckpoint,
    ) -> Result<(), RepositoryError>;

    async fn finish_progress(
        &self,
        id: SyncProgressId,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Stored status of a ShipStation order, if known.
    async fn order_status(
        &self,
        shipstation_order_id: i64,
    ) -> Result<Option<OrderStatus>, RepositoryError>;

    /// Upsert a customer by email. Unique conflicts surface as
    /// [`RepositoryError::Conflict`].
    async fn upsert_customer(&self, customer: &NewCustomer) -> Result<Customer, RepositoryError>;

    /// Upsert an order, its products and line items in one transaction.
    ///
    /// Item failures are isolated and reported; only an order-level failure
    /// returns an error. Open print tasks are completed when the status moves
    /// into shipped or cancelled.
    async fn upsert_order_with_items(
        &self,
        input: &OrderUpsert,
    ) -> Result<OrderUpsertReport, RepositoryError>;

    async fn upsert_tags(&self, tags: &[TagRecord]) -> Result<u64, RepositoryError>;
}

// =============================================================================
// PostgreSQL implementations
// =============================================================================

/// [`ReconciliationStore`] over `PostgreSQL`.
#[derive(Clone)]
pub struct PgReconciliationStore {
    pool: PgPool,
}

impl PgReconciliationStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReconciliationStore for PgReconciliationStore {
    async fn find_order(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError> {
        OrderRepository::new(&self.pool).find_by_id(id).await
    }

    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .find_by_order_number(order_number)
            .await
    }

    async fn find_order_by_shipstation_id(
        &self,
        shipstation_order_id: i64,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .find_by_shipstation_id(shipstation_order_id)
            .await
    }

    async fn orders_for_processing(
        &self,
        limit: Option<u32>,
        include_with_tasks: bool,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .list_for_processing(limit.map(i64::from), include_with_tasks)
            .await
    }

    async fn tasks_for_order(&self, order_id: OrderId) -> Result<Vec<PrintTask>, RepositoryError> {
        PrintTaskRepository::new(&self.pool)
            .list_for_order(order_id)
            .await
    }

    #[tracing::instrument(skip(self, tasks), fields(task_count = tasks.len()))]
    async fn persist_order_tasks(
        &self,
        order_id: OrderId,
        tasks: &[TaskUpsert],
        replace_existing: bool,
    ) -> Result<PersistOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deleted = if replace_existing {
            print_tasks::delete_for_order(&mut tx, order_id).await?
        } else {
            0
        };

        let mut stored = Vec::with_capacity(tasks.len());
        for task in tasks {
            stored.push(print_tasks::upsert(&mut tx, task).await?);
        }

        tx.commit().await?;
        Ok(PersistOutcome {
            deleted,
            tasks: stored,
        })
    }

    async fn delete_all_tasks(&self) -> Result<u64, RepositoryError> {
        PrintTaskRepository::new(&self.pool).delete_all().await
    }

    async fn record_ai_call(&self, log: &NewAiCallLog) -> Result<(), RepositoryError> {
        AiCallLogRepository::new(&self.pool).insert(log).await?;
        Ok(())
    }
}

/// [`SyncStore`] over `PostgreSQL`.
#[derive(Clone)]
pub struct PgSyncStore {
    pool: PgPool,
}

impl PgSyncStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStore for PgSyncStore {
    async fn latest_order_modification(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        OrderRepository::new(&self.pool).latest_modification().await
    }

    async fn start_progress(&self, sync_type: SyncType) -> Result<SyncProgress, RepositoryError> {
        SyncProgressRepository::new(&self.pool).start(sync_type).await
    }

    async fn resume_failed_progress(
        &self,
        sync_type: SyncType,
    ) -> Result<Option<SyncProgress>, RepositoryError> {
        SyncProgressRepository::new(&self.pool)
            .resume_failed(sync_type)
            .await
    }

    async fn set_progress_total(&self, id: SyncProgressId, total: i32) -> Result<(), RepositoryError> {
        SyncProgressRepository::new(&self.pool)
            .set_total(id, total)
            .await
    }

    async fn record_order_outcome(
        &self,
        id: SyncProgressId,
        checkpoint: &OrderCheckpoint,
    ) -> Result<(), RepositoryError> {
        SyncProgressRepository::new(&self.pool)
            .record_order(id, checkpoint)
            .await
    }

    async fn finish_progress(
        &self,
        id: SyncProgressId,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        SyncProgressRepository::new(&self.pool)
            .finish(id, status, error)
            .await
    }

    async fn order_status(
        &self,
        shipstation_order_id: i64,
    ) -> Result<Option<OrderStatus>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .status_by_shipstation_id(shipstation_order_id)
            .await
    }

    async fn upsert_customer(&self, customer: &NewCustomer) -> Result<Customer, RepositoryError> {
        CustomerRepository::new(&self.pool).upsert(customer).await
    }

    #[tracing::instrument(
        skip(self, input),
        fields(
            shipstation_order_id = input.order.shipstation_order_id,
            order_number = %input.order.shipstation_order_number
        )
    )]
    async fn upsert_order_with_items(
        &self,
        input: &OrderUpsert,
    ) -> Result<OrderUpsertReport, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let previous = orders::lock_existing(&mut tx, input.order.shipstation_order_id).await?;
        let order_id = orders::upsert(&mut tx, &input.order, input.customer_id).await?;

        let mut report = OrderUpsertReport {
            order_id: Some(order_id),
            ..OrderUpsertReport::default()
        };

        for item in &input.items {
            // savepoint per item so one bad item leaves the order intact
            let mut savepoint = tx.begin().await?;
            match upsert_line_item(&mut savepoint, order_id, item).await {
                Ok(()) => {
                    savepoint.commit().await?;
                    report.items_processed += 1;
                }
                Err(error) => {
                    savepoint.rollback().await?;
                    tracing::warn!(
                        line_item_key = %item.shipstation_line_item_key,
                        %error,
                        "Failed to store line item"
                    );
                    report.item_errors.push(ItemSyncError {
                        item: item.shipstation_line_item_key.clone(),
                        error,
                    });
                }
            }
        }

        let previous_status = previous.map(|(_, status)| status);
        if input.order.order_status.completes_tasks_from(previous_status) {
            report.tasks_auto_completed =
                print_tasks::complete_open_for_order(&mut tx, order_id).await?;
            tracing::info!(
                previous = ?previous_status,
                current = %input.order.order_status,
                completed = report.tasks_auto_completed,
                "Order closed, auto-completed open print tasks"
            );
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn upsert_tags(&self, tags: &[TagRecord]) -> Result<u64, RepositoryError> {
        TagRepository::new(&self.pool).upsert_all(tags).await
    }
}

/// Store one line item. Errors come back as display text for the report.
async fn upsert_line_item(
    conn: &mut sqlx::PgConnection,
    order_id: OrderId,
    item: &NewOrderItem,
) -> Result<(), String> {
    let product = products::upsert(conn, &item.product)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| {
            format!(
                "Product could not be upserted. SKU: {}, Name: {}",
                item.product.sku.as_deref().unwrap_or("N/A"),
                item.product.name
            )
        })?;

    orders::upsert_item(conn, order_id, product.id, item)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}
