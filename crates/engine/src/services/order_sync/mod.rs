//! ShipStation to local database order sync.
//!
//! A run pages through ShipStation's order list in ascending modification
//! order, upserting each order with its customer, products and line items.
//! Progress is written after every order so an interrupted run can resume
//! from its checkpoint.

pub mod mapping;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;
use tracing::instrument;

use printline_core::{OrderStatus, SyncProgressId, SyncStatus, SyncType};

use crate::db::{RepositoryError, SyncStore};
use crate::models::{Customer, OrderCheckpoint, OrderUpsert, OrderUpsertReport, TagRecord};
use crate::shipstation::{ListOrdersParams, Order, OrderApi, ShipStationError, SortBy};

pub use mapping::{format_query_timestamp, map_customer, map_items, map_order, parse_timestamp};

/// Default start boundary when nothing has been synced yet.
#[must_use]
pub fn default_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Look-back window for `recent` syncs.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 2;

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("ShipStation error: {0}")]
    ShipStation(#[from] ShipStationError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("order {0} not found in ShipStation")]
    OrderNotFound(i64),
}

/// Which orders a run fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Orders modified since the checkpoint, or since `since` when given.
    Full {
        since: Option<DateTime<Utc>>,
        resume: bool,
    },
    /// Orders modified in the last `days` days.
    Recent { days: i64 },
    /// Orders placed within a date range, sorted by order date.
    OrderDateRange {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// One order by ShipStation order ID.
    Single { shipstation_order_id: i64 },
}

impl SyncMode {
    #[must_use]
    pub const fn sync_type(&self) -> SyncType {
        match self {
            Self::Full { .. } | Self::OrderDateRange { .. } => SyncType::Full,
            Self::Recent { .. } => SyncType::Recent,
            Self::Single { .. } => SyncType::Single,
        }
    }
}

/// Run-wide switches.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Log intended writes without touching the database.
    pub dry_run: bool,
    /// Fetch every status instead of only `awaiting_shipment`.
    pub all_statuses: bool,
    /// Stop after this many pages.
    pub page_limit: Option<u32>,
    /// Pause between page requests.
    pub page_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            all_statuses: false,
            page_limit: None,
            page_delay: Duration::from_millis(1500),
        }
    }
}

/// End-of-run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub progress_id: Option<SyncProgressId>,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub orders_fetched: usize,
    pub orders_processed: usize,
    pub orders_failed: usize,
    pub items_failed: usize,
    pub tasks_auto_completed: u64,
    pub pages_synced: u32,
    pub pages_available: Option<i64>,
    pub error: Option<String>,
}

impl SyncSummary {
    const fn new(sync_type: SyncType) -> Self {
        Self {
            progress_id: None,
            sync_type,
            status: SyncStatus::Running,
            orders_fetched: 0,
            orders_processed: 0,
            orders_failed: 0,
            items_failed: 0,
            tasks_auto_completed: 0,
            pages_synced: 0,
            pages_available: None,
            error: None,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, SyncStatus::Completed)
    }
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} sync {}: {} orders fetched, {} processed, {} failed ({} item errors); pages {}",
            self.sync_type,
            self.status,
            self.orders_fetched,
            self.orders_processed,
            self.orders_failed,
            self.items_failed,
            self.pages_synced,
        )?;
        if let Some(available) = self.pages_available {
            write!(f, "/{available}")?;
        }
        if self.tasks_auto_completed > 0 {
            write!(f, "; {} print tasks auto-completed", self.tasks_auto_completed)?;
        }
        if let Some(error) = &self.error {
            write!(f, "; error: {error}")?;
        }
        Ok(())
    }
}

/// Progress bookkeeping that is skipped entirely in dry runs.
struct Progress<'a> {
    store: &'a dyn SyncStore,
    id: Option<SyncProgressId>,
}

impl Progress<'_> {
    async fn set_total(&self, total: i64) -> Result<(), RepositoryError> {
        if let Some(id) = self.id {
            let total = i32::try_from(total).unwrap_or(i32::MAX);
            self.store.set_progress_total(id, total).await?;
        }
        Ok(())
    }

    async fn record(&self, checkpoint: &OrderCheckpoint) -> Result<(), RepositoryError> {
        if let Some(id) = self.id {
            self.store.record_order_outcome(id, checkpoint).await?;
        }
        Ok(())
    }

    async fn finish(&self, status: SyncStatus, error: Option<&str>) {
        let Some(id) = self.id else {
            return;
        };
        if let Err(e) = self.store.finish_progress(id, status, error).await {
            tracing::error!(progress_id = %id, error = %e, "Failed to finalize sync progress");
        }
    }
}

/// Pulls orders from ShipStation into the local store.
#[derive(Clone)]
pub struct OrderSyncService {
    api: Arc<dyn OrderApi>,
    store: Arc<dyn SyncStore>,
    options: SyncOptions,
}

impl OrderSyncService {
    #[must_use]
    pub fn new(api: Arc<dyn OrderApi>, store: Arc<dyn SyncStore>, options: SyncOptions) -> Self {
        Self {
            api,
            store,
            options,
        }
    }

    /// Run one sync.
    ///
    /// Failures fetching a page end the run with status `failed` in the
    /// summary; only failures setting the run up are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the progress record cannot be created or the
    /// order of a single-order sync does not exist.
    #[instrument(skip(self), fields(dry_run = self.options.dry_run))]
    pub async fn run(&self, mode: SyncMode) -> Result<SyncSummary, SyncError> {
        let sync_type = mode.sync_type();
        let mut summary = SyncSummary::new(sync_type);

        let resume = matches!(mode, SyncMode::Full { resume: true, .. });
        let (progress, resumed_from) = self.open_progress(sync_type, resume).await?;
        summary.progress_id = progress.id;

        let result = match mode {
            SyncMode::Single {
                shipstation_order_id,
            } => self.sync_single(shipstation_order_id, &progress, &mut summary).await,
            paged => match self.list_params(&paged, resumed_from).await {
                Ok(params) => self.sync_pages(params, &progress, &mut summary).await,
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(()) => {
                summary.status = SyncStatus::Completed;
                progress.finish(SyncStatus::Completed, None).await;
                tracing::info!(%summary, "Sync finished");
            }
            Err(e) => {
                let message = e.to_string();
                summary.status = SyncStatus::Failed;
                progress.finish(SyncStatus::Failed, Some(&message)).await;
                tracing::error!(%summary, "Sync failed");
                summary.error = Some(message);
                if matches!(e, SyncError::OrderNotFound(_)) {
                    return Err(e);
                }
            }
        }

        Ok(summary)
    }

    /// Mirror ShipStation's tag list into the local store.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the tags cannot be fetched or stored.
    #[instrument(skip(self))]
    pub async fn sync_tags(&self) -> Result<usize, SyncError> {
        let tags: Vec<TagRecord> = self
            .api
            .list_tags()
            .await?
            .into_iter()
            .map(|tag| TagRecord {
                shipstation_tag_id: tag.tag_id,
                name: tag.name,
                color_hex: tag.color,
            })
            .collect();

        if self.options.dry_run {
            tracing::info!(count = tags.len(), "Dry run: would upsert tags");
            return Ok(tags.len());
        }
        let stored = self.store.upsert_tags(&tags).await?;
        tracing::info!(fetched = tags.len(), stored, "Synced ShipStation tags");
        Ok(tags.len())
    }

    async fn open_progress(
        &self,
        sync_type: SyncType,
        resume: bool,
    ) -> Result<(Progress<'_>, Option<DateTime<Utc>>), SyncError> {
        let store = self.store.as_ref();
        if self.options.dry_run {
            return Ok((Progress { store, id: None }, None));
        }

        if resume {
            if let Some(previous) = self.store.resume_failed_progress(sync_type).await? {
                tracing::info!(
                    progress_id = %previous.id,
                    checkpoint = ?previous.last_processed_timestamp,
                    "Resuming failed sync"
                );
                let id = Some(previous.id);
                return Ok((Progress { store, id }, previous.last_processed_timestamp));
            }
            tracing::info!(%sync_type, "No failed sync to resume, starting a new one");
        }

        let started = self.store.start_progress(sync_type).await?;
        Ok((
            Progress {
                store,
                id: Some(started.id),
            },
            None,
        ))
    }

    async fn list_params(
        &self,
        mode: &SyncMode,
        resumed_from: Option<DateTime<Utc>>,
    ) -> Result<ListOrdersParams, SyncError> {
        let mut params = ListOrdersParams {
            order_status: (!self.options.all_statuses)
                .then(|| OrderStatus::AwaitingShipment.as_str().to_string()),
            ..ListOrdersParams::default()
        };

        match mode {
            SyncMode::Full { since, .. } => {
                let start = match (since, resumed_from) {
                    (Some(since), _) => *since,
                    (None, Some(checkpoint)) => checkpoint + TimeDelta::milliseconds(1),
                    (None, None) => self
                        .store
                        .latest_order_modification()
                        .await?
                        .map_or_else(default_start, |latest| latest + TimeDelta::milliseconds(1)),
                };
                tracing::info!(start = %start, "Syncing orders modified since");
                params.modify_date_start = Some(format_query_timestamp(start));
            }
            SyncMode::Recent { days } => {
                let start = Utc::now() - TimeDelta::days(*days);
                tracing::info!(days, start = %start, "Syncing recent orders");
                params.modify_date_start = Some(format_query_timestamp(start));
            }
            SyncMode::OrderDateRange { start, end } => {
                params.sort_by = SortBy::OrderDate;
                params.order_date_start = start.map(format_query_timestamp);
                params.order_date_end = end.map(format_query_timestamp);
            }
            SyncMode::Single { .. } => {}
        }
        Ok(params)
    }

    async fn sync_pages(
        &self,
        base: ListOrdersParams,
        progress: &Progress<'_>,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        let mut page = 1u32;
        loop {
            if self
                .options
                .page_limit
                .is_some_and(|limit| summary.pages_synced >= limit)
            {
                tracing::info!(pages = summary.pages_synced, "Page limit reached");
                break;
            }

            let params = ListOrdersParams {
                page,
                ..base.clone()
            };
            tracing::info!(page, "Fetching orders page");
            let response = self.api.list_orders(&params).await?;

            if page == 1 {
                summary.pages_available = Some(response.pages);
                progress.set_total(response.total).await?;
                tracing::info!(total = response.total, pages = response.pages, "Orders to sync");
            }
            if response.orders.is_empty() {
                tracing::info!(page, "No orders returned, ending sync");
                break;
            }

            for order in &response.orders {
                self.sync_order(order, progress, summary).await?;
            }
            summary.pages_synced += 1;

            if i64::from(page) >= response.pages {
                break;
            }
            page += 1;
            if !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }
        }
        Ok(())
    }

    async fn sync_single(
        &self,
        shipstation_order_id: i64,
        progress: &Progress<'_>,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        progress.set_total(1).await?;
        let page = match self.api.get_order(shipstation_order_id).await {
            Err(ShipStationError::NotFound(_)) => {
                return Err(SyncError::OrderNotFound(shipstation_order_id));
            }
            other => other?,
        };
        let order = page
            .orders
            .into_iter()
            .next()
            .ok_or(SyncError::OrderNotFound(shipstation_order_id))?;
        summary.pages_available = Some(1);
        self.sync_order(&order, progress, summary).await?;
        summary.pages_synced = 1;
        Ok(())
    }

    /// Store one order and record the outcome against the run.
    ///
    /// Order-level failures are counted, not returned; only a failure
    /// writing the checkpoint itself aborts the run.
    async fn sync_order(
        &self,
        order: &Order,
        progress: &Progress<'_>,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        summary.orders_fetched += 1;
        let succeeded = match self.upsert_order(order).await {
            Ok(report) => {
                summary.orders_processed += 1;
                summary.items_failed += report.item_errors.len();
                summary.tasks_auto_completed += report.tasks_auto_completed;
                for item_error in &report.item_errors {
                    tracing::warn!(
                        order_number = %order.order_number,
                        item = %item_error.item,
                        error = %item_error.error,
                        "Line item not stored"
                    );
                }
                true
            }
            Err(e) => {
                summary.orders_failed += 1;
                tracing::error!(
                    order_number = %order.order_number,
                    shipstation_order_id = order.order_id,
                    error = %e,
                    "Order sync failed"
                );
                false
            }
        };

        progress
            .record(&OrderCheckpoint {
                shipstation_order_id: order.order_id,
                modified_at: order.modify_date.as_deref().and_then(parse_timestamp),
                succeeded,
            })
            .await?;
        Ok(())
    }

    async fn upsert_order(&self, order: &Order) -> Result<OrderUpsertReport, SyncError> {
        let (items, skipped) = map_items(order);
        let mapped = map_order(order);

        if self.options.dry_run {
            let previous = self.store.order_status(order.order_id).await?;
            tracing::info!(
                order_number = %order.order_number,
                exists = previous.is_some(),
                status = %mapped.order_status,
                items = items.len(),
                skipped = skipped.len(),
                "Dry run: would upsert order"
            );
            return Ok(OrderUpsertReport {
                order_id: None,
                items_processed: items.len(),
                item_errors: skipped,
                tasks_auto_completed: 0,
            });
        }

        let customer = self.upsert_customer(order).await;
        let input = OrderUpsert {
            order: mapped,
            customer_id: customer.map(|c| c.id),
            items,
        };
        let mut report = self.store.upsert_order_with_items(&input).await?;
        report.item_errors.extend(skipped);
        tracing::debug!(
            order_number = %order.order_number,
            items = report.items_processed,
            item_errors = report.item_errors.len(),
            "Order stored"
        );
        Ok(report)
    }

    /// Customer linkage is best effort; the order is stored either way.
    async fn upsert_customer(&self, order: &Order) -> Option<Customer> {
        let Some(customer) = map_customer(order) else {
            tracing::warn!(
                order_number = %order.order_number,
                "Customer email is missing, order stored without customer"
            );
            return None;
        };
        match self.store.upsert_customer(&customer).await {
            Ok(stored) => Some(stored),
            Err(RepositoryError::Conflict(detail)) => {
                tracing::warn!(
                    order_number = %order.order_number,
                    email = %customer.email,
                    %detail,
                    "Customer unique conflict, order stored without customer"
                );
                None
            }
            Err(e) => {
                tracing::error!(
                    order_number = %order.order_number,
                    error = %e,
                    "Customer upsert failed, order stored without customer"
                );
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_start_is_2022() {
        assert_eq!(default_start().to_rfc3339(), "2022-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_mode_sync_types() {
        assert_eq!(
            SyncMode::OrderDateRange {
                start: None,
                end: None
            }
            .sync_type(),
            SyncType::Full
        );
        assert_eq!(SyncMode::Recent { days: 2 }.sync_type(), SyncType::Recent);
        assert_eq!(
            SyncMode::Single {
                shipstation_order_id: 1
            }
            .sync_type(),
            SyncType::Single
        );
    }

    #[test]
    fn test_summary_display() {
        let mut summary = SyncSummary::new(SyncType::Full);
        summary.status = SyncStatus::Completed;
        summary.orders_fetched = 3;
        summary.orders_processed = 2;
        summary.orders_failed = 1;
        summary.pages_synced = 1;
        summary.pages_available = Some(4);
        assert_eq!(
            summary.to_string(),
            "full sync completed: 3 orders fetched, 2 processed, 1 failed (0 item errors); pages 1/4"
        );
    }
}
