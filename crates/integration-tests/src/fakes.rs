//! In-memory stand-ins for the engine's storage, API and model seams.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use printline_core::{
    CustomerId, OrderId, OrderStatus, PrintTaskId, SyncProgressId, SyncStatus, SyncType,
};
use printline_engine::ai::{AiError, CompletionProvider};
use printline_engine::customization::{ArchiveFetcher, ResolveError};
use printline_engine::db::{ReconciliationStore, RepositoryError, SyncStore};
use printline_engine::models::{
    Customer, ItemSyncError, NewAiCallLog, NewCustomer, OrderCheckpoint, OrderUpsert, OrderUpsertReport,
    OrderWithItems, PersistOutcome, PrintTask, SyncProgress, TagRecord, TaskFields, TaskUpsert,
};
use printline_engine::shipstation::{
    ListOrdersParams, Order as ShipStationOrder, OrderApi, OrdersPage, ShipStationError, Tag,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Reconciliation store
// =============================================================================

/// [`ReconciliationStore`] over vectors.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    orders: Vec<OrderWithItems>,
    tasks: Vec<PrintTask>,
    ai_calls: Vec<NewAiCallLog>,
    next_task_id: i32,
    fail_persist: bool,
}

impl StoreState {
    fn upsert(&mut self, upsert: &TaskUpsert) -> PrintTask {
        let now = Utc::now();
        if let Some(task) = self
            .tasks
            .iter_mut()
            .find(|t| t.order_item_id == upsert.order_item_id && t.task_index == upsert.task_index)
        {
            write_fields(task, &upsert.fields);
            task.updated_at = now;
            return task.clone();
        }

        self.next_task_id += 1;
        let linkage = &upsert.linkage;
        let mut task = PrintTask {
            id: PrintTaskId::new(self.next_task_id),
            order_id: linkage.order_id,
            order_item_id: upsert.order_item_id,
            task_index: upsert.task_index,
            product_id: linkage.product_id,
            customer_id: linkage.customer_id,
            shorthand_product_name: linkage.shorthand_product_name.clone(),
            marketplace_order_number: linkage.marketplace_order_number.clone(),
            custom_text: None,
            color_1: None,
            color_2: None,
            quantity: 0,
            status: upsert.fields.status,
            needs_review: false,
            review_reason: None,
            annotation: None,
            ship_by_date: None,
            created_at: now,
            updated_at: now,
        };
        write_fields(&mut task, &upsert.fields);
        self.tasks.push(task.clone());
        task
    }
}

fn write_fields(task: &mut PrintTask, fields: &TaskFields) {
    task.custom_text.clone_from(&fields.custom_text);
    task.color_1.clone_from(&fields.color_1);
    task.color_2.clone_from(&fields.color_2);
    task.quantity = fields.quantity;
    task.status = fields.status;
    task.needs_review = fields.needs_review;
    task.review_reason.clone_from(&fields.review_reason);
    task.annotation.clone_from(&fields.annotation);
    task.ship_by_date = fields.ship_by_date;
}

impl MemoryStore {
    #[must_use]
    pub fn with_orders(orders: impl IntoIterator<Item = OrderWithItems>) -> Self {
        let store = Self::default();
        lock(&store.state).orders.extend(orders);
        store
    }

    /// Write tasks directly, as an earlier run would have.
    pub fn seed_tasks(&self, upserts: &[TaskUpsert]) -> Vec<PrintTask> {
        let mut state = lock(&self.state);
        upserts.iter().map(|u| state.upsert(u)).collect()
    }

    /// Every task, ordered by item and index.
    #[must_use]
    pub fn tasks(&self) -> Vec<PrintTask> {
        let mut tasks = lock(&self.state).tasks.clone();
        tasks.sort_by_key(|t| (t.order_item_id, t.task_index));
        tasks
    }

    #[must_use]
    pub fn tasks_of(&self, order_id: OrderId) -> Vec<PrintTask> {
        self.tasks()
            .into_iter()
            .filter(|t| t.order_id == order_id)
            .collect()
    }

    #[must_use]
    pub fn ai_calls(&self) -> Vec<NewAiCallLog> {
        lock(&self.state).ai_calls.clone()
    }

    /// Make every later `persist_order_tasks` call fail.
    pub fn fail_persist(&self) {
        lock(&self.state).fail_persist = true;
    }
}

#[async_trait]
impl ReconciliationStore for MemoryStore {
    async fn find_order(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError> {
        Ok(lock(&self.state)
            .orders
            .iter()
            .find(|o| o.order.id == id)
            .cloned())
    }

    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        Ok(lock(&self.state)
            .orders
            .iter()
            .filter(|o| o.order.shipstation_order_number == order_number)
            .max_by_key(|o| o.order.order_date)
            .cloned())
    }

    async fn find_order_by_shipstation_id(
        &self,
        shipstation_order_id: i64,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        Ok(lock(&self.state)
            .orders
            .iter()
            .find(|o| o.order.shipstation_order_id == shipstation_order_id)
            .cloned())
    }

    async fn orders_for_processing(
        &self,
        limit: Option<u32>,
        include_with_tasks: bool,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        let state = lock(&self.state);
        let mut orders: Vec<OrderWithItems> = state
            .orders
            .iter()
            .filter(|o| o.order.order_status.is_queue_eligible())
            .filter(|o| include_with_tasks || !state.tasks.iter().any(|t| t.order_id == o.order.id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.order.order_date.cmp(&a.order.order_date));
        if let Some(limit) = limit {
            orders.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(orders)
    }

    async fn tasks_for_order(&self, order_id: OrderId) -> Result<Vec<PrintTask>, RepositoryError> {
        Ok(self.tasks_of(order_id))
    }

    async fn persist_order_tasks(
        &self,
        order_id: OrderId,
        tasks: &[TaskUpsert],
        replace_existing: bool,
    ) -> Result<PersistOutcome, RepositoryError> {
        let mut state = lock(&self.state);
        if state.fail_persist {
            return Err(RepositoryError::DataCorruption("injected failure".to_string()));
        }

        let mut deleted = 0;
        if replace_existing {
            let before = state.tasks.len();
            state.tasks.retain(|t| t.order_id != order_id);
            deleted = u64::try_from(before - state.tasks.len()).unwrap_or(u64::MAX);
        }
        let tasks = tasks.iter().map(|u| state.upsert(u)).collect();
        Ok(PersistOutcome { deleted, tasks })
    }

    async fn delete_all_tasks(&self) -> Result<u64, RepositoryError> {
        let mut state = lock(&self.state);
        let deleted = u64::try_from(state.tasks.len()).unwrap_or(u64::MAX);
        state.tasks.clear();
        Ok(deleted)
    }

    async fn record_ai_call(&self, log: &NewAiCallLog) -> Result<(), RepositoryError> {
        lock(&self.state).ai_calls.push(log.clone());
        Ok(())
    }
}

// =============================================================================
// Sync store
// =============================================================================

/// [`SyncStore`] keyed by ShipStation order ID.
#[derive(Default)]
pub struct MemorySyncStore {
    state: Mutex<SyncState>,
}

#[derive(Default)]
struct SyncState {
    runs: Vec<SyncProgress>,
    orders: BTreeMap<i64, OrderUpsert>,
    customers: Vec<Customer>,
    tags: BTreeMap<i64, TagRecord>,
    conflicting_emails: Vec<String>,
    failing_items: Vec<String>,
    open_tasks: BTreeMap<i64, u64>,
}

impl MemorySyncStore {
    /// Record an earlier run, e.g. a failed one to resume.
    pub fn seed_run(&self, run: SyncProgress) {
        lock(&self.state).runs.push(run);
    }

    /// Make customer upserts for `email` fail with a unique conflict.
    pub fn conflict_on(&self, email: &str) {
        lock(&self.state).conflicting_emails.push(email.to_string());
    }

    /// Make storing the line item with this key fail.
    pub fn fail_item(&self, line_item_key: &str) {
        lock(&self.state).failing_items.push(line_item_key.to_string());
    }

    /// Give an order `count` pending print tasks.
    pub fn seed_open_tasks(&self, shipstation_order_id: i64, count: u64) {
        lock(&self.state).open_tasks.insert(shipstation_order_id, count);
    }

    /// Pending print tasks left on an order.
    #[must_use]
    pub fn open_tasks(&self, shipstation_order_id: i64) -> u64 {
        lock(&self.state)
            .open_tasks
            .get(&shipstation_order_id)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn runs(&self) -> Vec<SyncProgress> {
        lock(&self.state).runs.clone()
    }

    #[must_use]
    pub fn order(&self, shipstation_order_id: i64) -> Option<OrderUpsert> {
        lock(&self.state).orders.get(&shipstation_order_id).cloned()
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        lock(&self.state).orders.len()
    }

    #[must_use]
    pub fn customers(&self) -> Vec<Customer> {
        lock(&self.state).customers.clone()
    }

    #[must_use]
    pub fn tags(&self) -> Vec<TagRecord> {
        lock(&self.state).tags.values().cloned().collect()
    }

    fn with_run<F>(&self, id: SyncProgressId, update: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut SyncProgress),
    {
        let mut state = lock(&self.state);
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RepositoryError::NotFound)?;
        update(run);
        Ok(())
    }
}

fn new_run(id: usize, sync_type: SyncType) -> SyncProgress {
    SyncProgress {
        id: SyncProgressId::new(i32::try_from(id).unwrap_or(i32::MAX)),
        sync_type,
        status: SyncStatus::Running,
        started_at: Utc::now(),
        ended_at: None,
        total_orders: 0,
        processed_orders: 0,
        failed_orders: 0,
        last_processed_order_id: None,
        last_processed_timestamp: None,
        error: None,
    }
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    async fn latest_order_modification(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        Ok(lock(&self.state)
            .orders
            .values()
            .filter_map(|o| o.order.shipstation_modified_at)
            .max())
    }

    async fn start_progress(&self, sync_type: SyncType) -> Result<SyncProgress, RepositoryError> {
        let mut state = lock(&self.state);
        let run = new_run(state.runs.len() + 1, sync_type);
        state.runs.push(run.clone());
        Ok(run)
    }

    async fn resume_failed_progress(
        &self,
        sync_type: SyncType,
    ) -> Result<Option<SyncProgress>, RepositoryError> {
        let mut state = lock(&self.state);
        let Some(previous) = state
            .runs
            .iter()
            .rev()
            .find(|r| {
                r.sync_type == sync_type
                    && r.status == SyncStatus::Failed
                    && r.last_processed_order_id.is_some()
            })
            .cloned()
        else {
            return Ok(None);
        };
        let run = SyncProgress {
            total_orders: previous.total_orders,
            processed_orders: previous.processed_orders,
            failed_orders: previous.failed_orders,
            last_processed_order_id: previous.last_processed_order_id,
            last_processed_timestamp: previous.last_processed_timestamp,
            ..new_run(state.runs.len() + 1, sync_type)
        };
        state.runs.push(run.clone());
        Ok(Some(run))
    }

    async fn set_progress_total(&self, id: SyncProgressId, total: i32) -> Result<(), RepositoryError> {
        self.with_run(id, |run| run.total_orders = total)
    }

    async fn record_order_outcome(
        &self,
        id: SyncProgressId,
        checkpoint: &OrderCheckpoint,
    ) -> Result<(), RepositoryError> {
        self.with_run(id, |run| {
            if checkpoint.succeeded {
                run.processed_orders += 1;
            } else {
                run.failed_orders += 1;
            }
            run.last_processed_order_id = Some(checkpoint.shipstation_order_id);
            if checkpoint.modified_at.is_some() {
                run.last_processed_timestamp = checkpoint.modified_at;
            }
        })
    }

    async fn finish_progress(
        &self,
        id: SyncProgressId,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.with_run(id, |run| {
            run.status = status;
            run.ended_at = Some(Utc::now());
            run.error = error.map(str::to_string);
        })
    }

    async fn order_status(
        &self,
        shipstation_order_id: i64,
    ) -> Result<Option<OrderStatus>, RepositoryError> {
        Ok(lock(&self.state)
            .orders
            .get(&shipstation_order_id)
            .map(|o| o.order.order_status))
    }

    async fn upsert_customer(&self, customer: &NewCustomer) -> Result<Customer, RepositoryError> {
        let mut state = lock(&self.state);
        if state.conflicting_emails.contains(&customer.email) {
            return Err(RepositoryError::Conflict(format!(
                "customers_email_key ({})",
                customer.email
            )));
        }
        if let Some(existing) = state.customers.iter_mut().find(|c| c.email == customer.email) {
            existing.name.clone_from(&customer.name);
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }

        let address = customer.address.clone().unwrap_or_default();
        let now = Utc::now();
        let stored = Customer {
            id: CustomerId::new(i32::try_from(state.customers.len() + 1).unwrap_or(i32::MAX)),
            email: customer.email.clone(),
            name: customer.name.clone(),
            shipstation_customer_id: customer.shipstation_customer_id.clone(),
            company: address.company,
            street1: address.street1,
            street2: address.street2,
            street3: address.street3,
            city: address.city,
            state: address.state,
            postal_code: address.postal_code,
            country_code: address.country_code,
            phone: address.phone,
            is_residential: address.is_residential,
            address_verified_status: address.address_verified_status,
            created_at: now,
            updated_at: now,
        };
        state.customers.push(stored.clone());
        Ok(stored)
    }

    async fn upsert_order_with_items(
        &self,
        input: &OrderUpsert,
    ) -> Result<OrderUpsertReport, RepositoryError> {
        let mut state = lock(&self.state);
        let shipstation_order_id = input.order.shipstation_order_id;
        let previous_status = state
            .orders
            .get(&shipstation_order_id)
            .map(|o| o.order.order_status);
        let position = state
            .orders
            .keys()
            .position(|id| *id == shipstation_order_id)
            .unwrap_or(state.orders.len());

        let mut stored = input.clone();
        let mut item_errors = Vec::new();
        stored.items.retain(|item| {
            let key = &item.shipstation_line_item_key;
            if state.failing_items.contains(key) {
                item_errors.push(ItemSyncError {
                    item: key.clone(),
                    error: "order_items_check violated".to_string(),
                });
                false
            } else {
                true
            }
        });
        let items_processed = stored.items.len();
        state.orders.insert(shipstation_order_id, stored);

        let closes = input.order.order_status.completes_tasks_from(previous_status);
        let tasks_auto_completed = if closes {
            state.open_tasks.remove(&shipstation_order_id).unwrap_or(0)
        } else {
            0
        };

        Ok(OrderUpsertReport {
            order_id: Some(OrderId::new(i32::try_from(position + 1).unwrap_or(i32::MAX))),
            items_processed,
            item_errors,
            tasks_auto_completed,
        })
    }

    async fn upsert_tags(&self, tags: &[TagRecord]) -> Result<u64, RepositoryError> {
        let mut state = lock(&self.state);
        for tag in tags {
            state.tags.insert(tag.shipstation_tag_id, tag.clone());
        }
        Ok(u64::try_from(tags.len()).unwrap_or(u64::MAX))
    }
}

// =============================================================================
// ShipStation
// =============================================================================

/// [`OrderApi`] serving fixed pages and recording every write.
#[derive(Default)]
pub struct FakeShipStation {
    state: Mutex<ApiState>,
}

#[derive(Default)]
struct ApiState {
    orders: BTreeMap<i64, ShipStationOrder>,
    pages: Vec<Vec<ShipStationOrder>>,
    tags: Vec<Tag>,
    list_requests: Vec<ListOrdersParams>,
    updates: Vec<ShipStationOrder>,
    failing_page: Option<u32>,
    fail_updates: bool,
}

impl FakeShipStation {
    /// Orders reachable by ID only.
    #[must_use]
    pub fn with_orders(orders: impl IntoIterator<Item = ShipStationOrder>) -> Self {
        let api = Self::default();
        {
            let mut state = lock(&api.state);
            for order in orders {
                state.orders.insert(order.order_id, order);
            }
        }
        api
    }

    /// Orders served by the list endpoint, one inner vector per page.
    #[must_use]
    pub fn with_pages(pages: Vec<Vec<ShipStationOrder>>) -> Self {
        let api = Self::with_orders(pages.iter().flatten().cloned());
        lock(&api.state).pages = pages;
        api
    }

    #[must_use]
    pub fn with_tags(self, tags: Vec<Tag>) -> Self {
        lock(&self.state).tags = tags;
        self
    }

    /// Make the list call for `page` fail with a server error.
    pub fn fail_page(&self, page: u32) {
        lock(&self.state).failing_page = Some(page);
    }

    pub fn fail_updates(&self) {
        lock(&self.state).fail_updates = true;
    }

    #[must_use]
    pub fn updates(&self) -> Vec<ShipStationOrder> {
        lock(&self.state).updates.clone()
    }

    #[must_use]
    pub fn list_requests(&self) -> Vec<ListOrdersParams> {
        lock(&self.state).list_requests.clone()
    }
}

#[async_trait]
impl OrderApi for FakeShipStation {
    async fn list_orders(&self, params: &ListOrdersParams) -> Result<OrdersPage, ShipStationError> {
        let mut state = lock(&self.state);
        state.list_requests.push(params.clone());
        if state.failing_page == Some(params.page) {
            return Err(ShipStationError::Api {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }

        let total: usize = state.pages.iter().map(Vec::len).sum();
        let index = usize::try_from(params.page.saturating_sub(1)).unwrap_or(usize::MAX);
        Ok(OrdersPage {
            orders: state.pages.get(index).cloned().unwrap_or_default(),
            total: i64::try_from(total).unwrap_or(i64::MAX),
            page: i64::from(params.page),
            pages: i64::try_from(state.pages.len()).unwrap_or(i64::MAX),
        })
    }

    async fn get_order(&self, order_id: i64) -> Result<OrdersPage, ShipStationError> {
        lock(&self.state)
            .orders
            .get(&order_id)
            .cloned()
            .map(OrdersPage::single)
            .ok_or_else(|| ShipStationError::NotFound(format!("order {order_id}")))
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, ShipStationError> {
        Ok(lock(&self.state).tags.clone())
    }

    async fn update_order(&self, order: &ShipStationOrder) -> Result<(), ShipStationError> {
        let mut state = lock(&self.state);
        if state.fail_updates {
            return Err(ShipStationError::Api {
                status: 400,
                body: "rejected".to_string(),
            });
        }
        state.updates.push(order.clone());
        state.orders.insert(order.order_id, order.clone());
        Ok(())
    }
}

// =============================================================================
// Completion model
// =============================================================================

/// [`CompletionProvider`] answering from a script.
///
/// Replies are consumed in order; the last one repeats.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, u16>>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    #[must_use]
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::default().then(reply)
    }

    /// A model whose API answers with `status`.
    #[must_use]
    pub fn failing(status: u16) -> Self {
        let model = Self::default();
        lock(&model.replies).push_back(Err(status));
        model
    }

    #[must_use]
    pub fn then(self, reply: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Ok(reply.into()));
        self
    }

    /// `(system, user)` pairs sent so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<(String, String)> {
        lock(&self.prompts).clone()
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedModel {
    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        lock(&self.prompts).push((system.to_string(), user.to_string()));
        let mut replies = lock(&self.replies);
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(status)) => Err(AiError::Api {
                status,
                message: "scripted failure".to_string(),
            }),
            None => Err(AiError::EmptyResponse),
        }
    }
}

// =============================================================================
// Customization archives
// =============================================================================

/// [`ArchiveFetcher`] serving archives from memory; unknown URLs are 404.
#[derive(Default)]
pub struct StaticArchives {
    archives: Mutex<BTreeMap<String, Vec<u8>>>,
    fetched: Mutex<Vec<String>>,
}

impl StaticArchives {
    #[must_use]
    pub fn with(self, url: &str, bytes: Vec<u8>) -> Self {
        lock(&self.archives).insert(url.to_string(), bytes);
        self
    }

    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }
}

#[async_trait]
impl ArchiveFetcher for StaticArchives {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        lock(&self.fetched).push(url.to_string());
        lock(&self.archives)
            .get(url)
            .cloned()
            .ok_or(ResolveError::Http(404))
    }
}
