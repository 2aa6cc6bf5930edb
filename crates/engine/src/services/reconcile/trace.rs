//! Per-order diagnostic trace, optionally appended to a file.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use printline_core::{DataSource, OrderId, OrderItemId, PrintTaskId};

use crate::ai::AiOrderResponse;
use crate::models::Order;

/// What happened to one order, phase by phase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTrace {
    pub order_id: OrderId,
    pub order_number: String,
    pub marketplace: Option<String>,
    pub overall_status: String,
    pub items: BTreeMap<OrderItemId, ItemTrace>,
    pub ai_status: String,
    pub ai_model: Option<String>,
    pub ai_prompt: Option<String>,
    pub ai_raw_response: Option<String>,
    pub ai_parsed_response: Option<AiOrderResponse>,
    pub db_status: String,
    pub tasks_upserted: usize,
    pub tasks_needing_review: usize,
    pub push_status: String,
    pub push_items: usize,
    pub processing_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTrace {
    pub status: String,
    pub source: Option<DataSource>,
    pub error: Option<String>,
    pub created_task_ids: Vec<PrintTaskId>,
}

impl OrderTrace {
    #[must_use]
    pub fn new(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.shipstation_order_number.clone(),
            marketplace: order.marketplace.clone(),
            overall_status: "Starting".to_string(),
            items: BTreeMap::new(),
            ai_status: "Not Started".to_string(),
            ai_model: None,
            ai_prompt: None,
            ai_raw_response: None,
            ai_parsed_response: None,
            db_status: "Not Started".to_string(),
            tasks_upserted: 0,
            tasks_needing_review: 0,
            push_status: "Not Started".to_string(),
            push_items: 0,
            processing_error: None,
        }
    }

    pub fn item(&mut self, item_id: OrderItemId) -> &mut ItemTrace {
        self.items.entry(item_id).or_insert_with(|| ItemTrace {
            status: "Pending".to_string(),
            source: None,
            error: None,
            created_task_ids: Vec::new(),
        })
    }

    /// Record a failure that fails the whole order.
    pub fn fail(&mut self, status: &str, error: impl Into<String>) {
        self.overall_status = format!("Failed ({status})");
        self.processing_error = Some(error.into());
    }

    pub const fn is_failed(&self) -> bool {
        self.processing_error.is_some()
    }
}

/// Append `trace` to `path` as `--- Entry: <timestamp> ---` and pretty JSON.
///
/// Write failures are logged and otherwise ignored.
pub async fn append_trace(path: &Path, trace: &OrderTrace) {
    let body = match serde_json::to_string_pretty(trace) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize debug trace");
            return;
        }
    };
    let entry = format!(
        "\n--- Entry: {} ---\n{body}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    );

    if let Err(e) = write_entry(path, &entry).await {
        tracing::error!(path = %path.display(), error = %e, "Failed to write debug trace");
    }
}

async fn write_entry(path: &Path, entry: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(entry.as_bytes()).await?;
    // tokio completes file writes in the background until flushed
    file.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use printline_core::OrderStatus;

    use super::*;

    fn order() -> Order {
        Order {
            id: OrderId::new(5),
            shipstation_order_id: 50,
            shipstation_order_number: "A-5".to_string(),
            order_key: None,
            order_status: OrderStatus::AwaitingShipment,
            marketplace: Some("eBay".to_string()),
            customer_id: None,
            customer_name: None,
            customer_notes: None,
            internal_notes: None,
            order_date: None,
            ship_by_date: None,
            shipstation_modified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_item_entries_are_reused() {
        let mut trace = OrderTrace::new(&order());
        trace.item(OrderItemId::new(1)).status = "Deferred to AI".to_string();
        trace.item(OrderItemId::new(1)).created_task_ids.push(PrintTaskId::new(9));
        trace.item(OrderItemId::new(2));
        assert_eq!(trace.items.len(), 2);
        let first = &trace.items[&OrderItemId::new(1)];
        assert_eq!(first.status, "Deferred to AI");
        assert_eq!(first.created_task_ids, vec![PrintTaskId::new(9)]);
    }

    #[test]
    fn test_fail_marks_order() {
        let mut trace = OrderTrace::new(&order());
        assert!(!trace.is_failed());
        trace.fail("AI Error", "AI Extraction Failed: empty response");
        assert!(trace.is_failed());
        assert_eq!(trace.overall_status, "Failed (AI Error)");
    }

    #[tokio::test]
    async fn test_entries_are_on_disk_when_append_returns() {
        let path = std::env::temp_dir().join(format!("printline-trace-{}.log", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;
        let trace = OrderTrace::new(&order());

        append_trace(&path, &trace).await;
        append_trace(&path, &trace).await;

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.matches("--- Entry: ").count(), 2);
        assert!(written.contains("\"orderNumber\": \"A-5\""));
        assert!(written.trim_end().ends_with('}'));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
