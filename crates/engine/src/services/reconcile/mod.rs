//! Reconciliation of order personalizations into print tasks.
//!
//! Orders are handled one at a time, each through the same phases:
//!
//! 1. Deterministic sources per item (customization archive, buyer note)
//! 2. One AI call covering every item still unresolved
//! 3. One transaction writing all of the order's tasks
//! 4. Option push-back to ShipStation once the transaction has committed
//!
//! A failure in phase 2 or 3 fails that order only. Push-back failures are
//! logged; the stored tasks stay authoritative.

pub mod plan;
pub mod push;
pub mod trace;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use printline_core::OrderId;

use crate::ai::{AiExtraction, AiExtractor, Regeneration};
use crate::customization::{CustomizationFileResolver, Miss, Resolved, resolve_from_note};
use crate::db::{ReconciliationStore, RepositoryError};
use crate::models::{LineItem, Order, OrderWithItems, PrintTask, TaskUpsert};
use crate::shipstation::{OrderApi, PatchOutcome, patch};

pub use plan::{ItemPlan, ItemResolution, PLACEHOLDER_TEXT};
pub use push::PushPlan;
pub use trace::{ItemTrace, OrderTrace, append_trace};

/// Errors that stop a whole run.
///
/// Per-order failures are not errors; they are counted in [`RunSummary`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("no order matches '{0}'")]
    OrderNotFound(String),

    #[error("refusing to delete every print task without confirmation")]
    ClearNotConfirmed,

    #[error("AI extraction is required but no AI provider is configured")]
    AiNotConfigured,
}

/// Operator flags for one run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Local ID, order number or ShipStation order ID of a single order.
    pub order: Option<String>,
    pub limit: Option<u32>,
    /// Delete the targeted orders' tasks before writing new ones.
    pub force_recreate: bool,
    /// Keep existing custom text at the same task index.
    pub preserve_text: bool,
    /// Extract only; no writes to the database or ShipStation.
    pub dry_run: bool,
    /// Never call the AI; unresolved items become placeholders.
    pub skip_ai: bool,
    /// Push stored tasks to ShipStation without extracting.
    pub shipstation_sync_only: bool,
    /// Append each order's trace to this file.
    pub debug_file: Option<PathBuf>,
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_order_ids: Vec<OrderId>,
    pub tasks_upserted: usize,
}

impl RunSummary {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, trace: &OrderTrace) {
        self.processed += 1;
        if trace.is_failed() {
            self.failed += 1;
            self.failed_order_ids.push(trace.order_id);
        } else {
            self.succeeded += 1;
            self.tasks_upserted += trace.tasks_upserted;
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} orders. Succeeded: {}, Failed: {}.",
            self.processed, self.succeeded, self.failed
        )?;
        if !self.failed_order_ids.is_empty() {
            let ids: Vec<String> = self.failed_order_ids.iter().map(ToString::to_string).collect();
            write!(f, " Failed Order IDs: [{}]", ids.join(", "))?;
        }
        Ok(())
    }
}

/// Drives orders through extraction, persistence and push-back.
pub struct Orchestrator {
    store: Arc<dyn ReconciliationStore>,
    api: Arc<dyn OrderApi>,
    resolver: CustomizationFileResolver,
    ai: Option<AiExtractor>,
}

impl Orchestrator {
    /// `ai` may be `None` for runs that skip AI or only push stored tasks.
    #[must_use]
    pub const fn new(
        store: Arc<dyn ReconciliationStore>,
        api: Arc<dyn OrderApi>,
        resolver: CustomizationFileResolver,
        ai: Option<AiExtractor>,
    ) -> Self {
        Self {
            store,
            api,
            resolver,
            ai,
        }
    }

    /// Process the selected orders.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError` if the orders cannot be loaded, a single order
    /// was requested and not found, or AI is needed and not configured.
    #[instrument(skip(self, options), fields(order = options.order.as_deref(), dry_run = options.dry_run))]
    pub async fn run(&self, options: &ProcessOptions) -> Result<RunSummary, ReconcileError> {
        if self.ai.is_none() && !options.skip_ai && !options.shipstation_sync_only {
            return Err(ReconcileError::AiNotConfigured);
        }

        let orders = self.select_orders(options).await?;
        tracing::info!(orders = orders.len(), "Found orders to process");
        if options.debug_file.is_some() && options.order.is_none() {
            tracing::warn!("Debug trace enabled for a batch run; the file may grow large");
        }

        let mut summary = RunSummary::default();
        for entry in &orders {
            let trace = if options.shipstation_sync_only {
                self.push_stored(entry, options).await
            } else {
                self.process_order(entry, options).await
            };
            if let Some(path) = &options.debug_file {
                append_trace(path, &trace).await;
            }
            summary.record(&trace);
        }

        if summary.is_success() {
            tracing::info!(%summary, "Reconciliation finished");
        } else {
            tracing::warn!(%summary, "Reconciliation finished with failures");
        }
        Ok(summary)
    }

    /// Delete every print task.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::ClearNotConfirmed` unless `confirmed` is set,
    /// or a repository error.
    #[instrument(skip(self))]
    pub async fn clear_all_tasks(&self, confirmed: bool) -> Result<u64, ReconcileError> {
        if !confirmed {
            return Err(ReconcileError::ClearNotConfirmed);
        }
        let deleted = self.store.delete_all_tasks().await?;
        tracing::warn!(deleted, "Deleted all print tasks");
        Ok(deleted)
    }

    /// Look an order up by local ID (digits only), then order number, then
    /// ShipStation order ID. The first match wins.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Repository` if a lookup fails.
    pub async fn find_order(&self, identifier: &str) -> Result<Option<OrderWithItems>, ReconcileError> {
        let identifier = identifier.trim();
        let all_digits = !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit());

        if all_digits
            && let Ok(id) = identifier.parse::<i32>()
            && let Some(found) = self.store.find_order(OrderId::new(id)).await?
        {
            tracing::debug!(id, "Matched order by local ID");
            return Ok(Some(found));
        }
        if let Some(found) = self.store.find_order_by_number(identifier).await? {
            tracing::debug!(identifier, "Matched order by order number");
            return Ok(Some(found));
        }
        if let Ok(shipstation_id) = identifier.parse::<i64>() {
            return Ok(self.store.find_order_by_shipstation_id(shipstation_id).await?);
        }
        Ok(None)
    }

    async fn select_orders(&self, options: &ProcessOptions) -> Result<Vec<OrderWithItems>, ReconcileError> {
        if let Some(identifier) = options.order.as_deref() {
            let found = self
                .find_order(identifier)
                .await?
                .ok_or_else(|| ReconcileError::OrderNotFound(identifier.to_string()))?;
            return Ok(vec![found]);
        }
        let include_with_tasks = options.force_recreate || options.shipstation_sync_only;
        Ok(self
            .store
            .orders_for_processing(options.limit, include_with_tasks)
            .await?)
    }

    /// Deterministic sources, in priority order.
    async fn pre_extract(&self, order: &Order, line: &LineItem) -> Result<Resolved, Miss> {
        if order.is_amazon() {
            self.resolver.resolve_item(line).await
        } else if order.is_ebay() {
            let note = order.note().ok_or(Miss::NoNote)?;
            resolve_from_note(note, line)
        } else {
            Err(Miss::NotApplicable)
        }
    }

    #[instrument(skip_all, fields(order_id = %entry.order.id, order_number = %entry.order.shipstation_order_number))]
    async fn process_order(&self, entry: &OrderWithItems, options: &ProcessOptions) -> OrderTrace {
        let order = &entry.order;
        let mut trace = OrderTrace::new(order);
        tracing::info!(items = entry.items.len(), "Processing order");

        trace.overall_status = "Pre-processing Items".to_string();
        let mut plans: Vec<ItemPlan<'_>> = Vec::with_capacity(entry.items.len());
        let mut deferred: Vec<(&LineItem, Option<String>)> = Vec::new();
        for line in &entry.items {
            match self.pre_extract(order, line).await {
                Ok(resolved) => {
                    let item = trace.item(line.item.id);
                    item.status = "Resolved".to_string();
                    item.source = Some(resolved.source);
                    plans.push(ItemPlan {
                        line,
                        resolution: ItemResolution::Deterministic(resolved),
                        fallback_note: None,
                    });
                }
                Err(miss) => {
                    let item = trace.item(line.item.id);
                    item.status = "Deferred to AI".to_string();
                    let note = miss.is_failure().then(|| miss.to_string());
                    if note.is_none() {
                        tracing::debug!(item_id = %line.item.id, %miss, "No deterministic source");
                    }
                    item.error.clone_from(&note);
                    deferred.push((line, note));
                }
            }
        }

        if !deferred.is_empty() {
            match self.ai.as_ref().filter(|_| !options.skip_ai) {
                Some(ai) => {
                    if !self.extract_with_ai(ai, order, deferred, options, &mut plans, &mut trace).await {
                        return trace;
                    }
                }
                None => {
                    trace.ai_status = "Skipped".to_string();
                    for (line, note) in deferred {
                        let item = trace.item(line.item.id);
                        item.status = "Placeholder".to_string();
                        plans.push(ItemPlan {
                            line,
                            resolution: ItemResolution::Placeholder {
                                reason: "AI extraction skipped".to_string(),
                            },
                            fallback_note: note,
                        });
                    }
                }
            }
        } else {
            trace.ai_status = "Not Needed".to_string();
        }
        plans.sort_by_key(|plan| plan.line.item.id);
        for plan in &plans {
            trace.item(plan.line.item.id).source = Some(plan.resolution.source());
        }

        let existing = if options.preserve_text {
            match self.store.tasks_for_order(order.id).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load existing tasks");
                    trace.fail("DB Error", format!("Loading existing tasks failed: {e}"));
                    return trace;
                }
            }
        } else {
            Vec::new()
        };

        let upserts: Vec<TaskUpsert> = plans
            .iter()
            .flat_map(|plan| plan.upserts(order, &existing, options.preserve_text))
            .collect();
        trace.tasks_needing_review = upserts.iter().filter(|u| u.fields.needs_review).count();
        let push = PushPlan::from_plans(&plans);
        trace.push_items = push.patch.len();

        if options.dry_run {
            for upsert in &upserts {
                tracing::info!(
                    item_id = %upsert.order_item_id,
                    task_index = upsert.task_index,
                    custom_text = ?upsert.fields.custom_text,
                    color_1 = ?upsert.fields.color_1,
                    needs_review = upsert.fields.needs_review,
                    "Dry run: would upsert task"
                );
            }
            tracing::info!(items = push.patch.len(), reasons = ?push.reasons, "Dry run: would push options");
            trace.tasks_upserted = upserts.len();
            trace.db_status = "Dry Run Skipped".to_string();
            trace.push_status = "Dry Run Skipped".to_string();
            trace.overall_status = "Completed (Dry Run)".to_string();
            return trace;
        }

        trace.overall_status = "Writing Tasks".to_string();
        let outcome = match self
            .store
            .persist_order_tasks(order.id, &upserts, options.force_recreate)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Task transaction failed");
                trace.db_status = "Failed (Transaction Error)".to_string();
                trace.push_status = "Skipped (Transaction Failed)".to_string();
                trace.fail("Transaction Error", format!("Transaction failed: {e}"));
                return trace;
            }
        };
        if outcome.deleted > 0 {
            tracing::info!(deleted = outcome.deleted, "Removed existing tasks before recreating");
        }
        for task in &outcome.tasks {
            trace.item(task.order_item_id).created_task_ids.push(task.id);
        }
        trace.tasks_upserted = outcome.tasks.len();
        trace.db_status = "Tasks Upserted".to_string();

        trace.push_status = describe_push(&self.push(order, &push, &outcome.tasks).await);
        trace.overall_status = "Completed".to_string();
        tracing::info!(
            tasks = trace.tasks_upserted,
            needs_review = trace.tasks_needing_review,
            push = %trace.push_status,
            "Finished order"
        );
        trace
    }

    /// Returns `false` when the order must stop here.
    async fn extract_with_ai<'a>(
        &self,
        ai: &AiExtractor,
        order: &Order,
        deferred: Vec<(&'a LineItem, Option<String>)>,
        options: &ProcessOptions,
        plans: &mut Vec<ItemPlan<'a>>,
        trace: &mut OrderTrace,
    ) -> bool {
        trace.overall_status = "Calling AI".to_string();
        trace.ai_status = "In Progress".to_string();
        trace.ai_model = Some(ai.model().to_string());

        let lines: Vec<&LineItem> = deferred.iter().map(|(line, _)| *line).collect();
        let regeneration = Regeneration::from_flags(options.force_recreate, options.preserve_text);
        let extraction = ai.extract(order, &lines, regeneration).await;

        if options.dry_run {
            tracing::debug!("Dry run: not recording AI call");
        } else if let Err(e) = self.store.record_ai_call(&extraction.log).await {
            tracing::warn!(error = %e, "Failed to record AI call");
        }

        let AiExtraction {
            outcome,
            prompt,
            raw_response,
            ..
        } = extraction;
        trace.ai_prompt = Some(prompt);
        trace.ai_raw_response = raw_response;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "AI extraction failed, no tasks written for order");
                trace.ai_status = "Failed".to_string();
                trace.fail("AI Error", format!("AI Extraction Failed: {e}"));
                return false;
            }
        };

        trace.ai_status = "Success".to_string();
        for (line, note) in deferred {
            let resolution = ItemResolution::from_ai(&response, line);
            trace.item(line.item.id).status = match &resolution {
                ItemResolution::Placeholder { reason } => format!("Placeholder ({reason})"),
                _ => "Resolved by AI".to_string(),
            };
            plans.push(ItemPlan {
                line,
                resolution,
                fallback_note: note,
            });
        }
        trace.ai_parsed_response = Some(response);
        true
    }

    /// Push stored tasks without extracting.
    #[instrument(skip_all, fields(order_id = %entry.order.id, order_number = %entry.order.shipstation_order_number))]
    async fn push_stored(&self, entry: &OrderWithItems, options: &ProcessOptions) -> OrderTrace {
        let order = &entry.order;
        let mut trace = OrderTrace::new(order);
        trace.ai_status = "Skipped".to_string();
        trace.db_status = "Skipped".to_string();

        let tasks = match self.store.tasks_for_order(order.id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load stored tasks");
                trace.fail("DB Error", format!("Loading stored tasks failed: {e}"));
                return trace;
            }
        };
        let push = PushPlan::from_tasks(&entry.items, &tasks);
        trace.push_items = push.patch.len();

        if options.dry_run {
            tracing::info!(items = push.patch.len(), reasons = ?push.reasons, "Dry run: would push stored tasks");
            trace.push_status = "Dry Run Skipped".to_string();
            trace.overall_status = "Completed (Dry Run)".to_string();
            return trace;
        }

        let outcome = self.push(order, &push, &tasks).await;
        trace.push_status = describe_push(&outcome);
        if let PatchOutcome::Failed(reason) = outcome {
            trace.fail("Push Error", reason);
        } else {
            trace.overall_status = "Completed".to_string();
        }
        trace
    }

    async fn push(&self, order: &Order, push: &PushPlan, tasks: &[PrintTask]) -> PatchOutcome {
        if push.is_empty() {
            return PatchOutcome::Skipped("no data".to_string());
        }
        let note = push.audit_note(order, tasks, Utc::now());
        let outcome = patch::apply_batch(
            self.api.as_ref(),
            order.shipstation_order_id,
            &push.patch,
            Some(&note),
        )
        .await;
        if let PatchOutcome::Failed(reason) = &outcome {
            tracing::warn!(reason = %reason, "Option push-back failed; stored tasks are unaffected");
        }
        outcome
    }
}

fn describe_push(outcome: &PatchOutcome) -> String {
    match outcome {
        PatchOutcome::Updated { items } => format!("Success ({items} items)"),
        PatchOutcome::Skipped(reason) => format!("Skipped ({reason})"),
        PatchOutcome::Failed(reason) => format!("Failed ({reason})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lists_failed_orders() {
        let summary = RunSummary {
            processed: 3,
            succeeded: 1,
            failed: 2,
            failed_order_ids: vec![OrderId::new(4), OrderId::new(9)],
            tasks_upserted: 2,
        };
        assert!(!summary.is_success());
        assert_eq!(
            summary.to_string(),
            "Processed 3 orders. Succeeded: 1, Failed: 2. Failed Order IDs: [4, 9]"
        );
    }

    #[test]
    fn test_clean_summary_has_no_id_list() {
        let summary = RunSummary {
            processed: 2,
            succeeded: 2,
            ..RunSummary::default()
        };
        assert!(summary.is_success());
        assert_eq!(summary.to_string(), "Processed 2 orders. Succeeded: 2, Failed: 0.");
    }

    #[test]
    fn test_push_descriptions() {
        assert_eq!(describe_push(&PatchOutcome::Updated { items: 2 }), "Success (2 items)");
        assert_eq!(
            describe_push(&PatchOutcome::Skipped("order is shipped".to_string())),
            "Skipped (order is shipped)"
        );
    }
}
