//! Item option patch-back.
//!
//! ShipStation has no endpoint for editing one item's options, so the whole
//! order is re-fetched, merged and posted back through `createorder`.

use tracing::instrument;

use super::types::{Dimensions, ItemOption, Order};
use super::{ItemOptionsPatch, OrderApi};
use crate::models::print_task::truncate_chars;

/// Maximum length ShipStation accepts for internal notes.
pub const INTERNAL_NOTES_MAX: usize = 1000;

const TRUNCATION_MARKER: &str = "... [truncated]";
const CM_PER_INCH: f64 = 2.54;

/// Result of a patch-back attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The order was posted back with this many items changed.
    Updated { items: usize },
    /// Nothing was sent.
    Skipped(String),
    /// The update was attempted and failed.
    Failed(String),
}

impl PatchOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

/// Re-fetch `order_id`, merge `patch` into it and post it back.
///
/// Never errors; every failure is logged and returned as an outcome.
#[instrument(skip(api, patch, audit_note), fields(items = patch.len()))]
pub async fn apply_batch<A: OrderApi + ?Sized>(
    api: &A,
    order_id: i64,
    patch: &ItemOptionsPatch,
    audit_note: Option<&str>,
) -> PatchOutcome {
    if patch.is_empty() {
        return PatchOutcome::Skipped("no line items to update".to_string());
    }

    let fresh = match api.get_order(order_id).await {
        Ok(page) => page.orders.into_iter().next(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not re-fetch order before patching options");
            return PatchOutcome::Failed(format!("re-fetch failed: {e}"));
        }
    };
    let Some(fresh) = fresh else {
        tracing::warn!("Re-fetch returned no order");
        return PatchOutcome::Failed("order not returned by re-fetch".to_string());
    };

    if matches!(fresh.order_status.as_str(), "shipped" | "cancelled") {
        tracing::info!(status = %fresh.order_status, "Order is closed, not patching options");
        return PatchOutcome::Skipped(format!("order is {}", fresh.order_status));
    }

    let targeted = fresh
        .items
        .iter()
        .filter(|i| i.line_item_key.as_ref().is_some_and(|k| patch.contains_key(k)))
        .count();
    if targeted < patch.len() {
        let missing: Vec<&str> = patch
            .keys()
            .filter(|k| {
                !fresh
                    .items
                    .iter()
                    .any(|i| i.line_item_key.as_deref() == Some(k.as_str()))
            })
            .map(String::as_str)
            .collect();
        tracing::warn!(?missing, "Line items not found on the fresh order");
    }
    if targeted == 0 {
        return PatchOutcome::Failed("none of the line items exist on the order".to_string());
    }

    let patched = build_patched_order(&fresh, patch, audit_note);
    match api.update_order(&patched).await {
        Ok(()) => {
            tracing::info!(items = targeted, "Patched item options");
            PatchOutcome::Updated { items: targeted }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to post patched order");
            PatchOutcome::Failed(e.to_string())
        }
    }
}

/// Merge `patch` into a freshly fetched order, producing the payload to post.
///
/// Only the targeted items' options are replaced. Null option values become
/// empty strings, inch dimensions are converted to centimeters, the audit
/// note is appended to the internal notes and customer notes are cleared.
#[must_use]
pub fn build_patched_order(
    fresh: &Order,
    patch: &ItemOptionsPatch,
    audit_note: Option<&str>,
) -> Order {
    let mut order = fresh.clone();

    for item in &mut order.items {
        if let Some(options) = item.line_item_key.as_ref().and_then(|k| patch.get(k)) {
            item.options.clone_from(options);
        }
        let options = std::mem::take(&mut item.options);
        item.options = options.into_iter().map(non_null_option).collect();
    }

    order.dimensions = order.dimensions.as_ref().and_then(to_centimeters);

    if let Some(note) = audit_note {
        order.internal_notes = Some(append_note(order.internal_notes.as_deref(), note));
    }

    order.customer_notes = None;
    order
}

fn non_null_option(option: ItemOption) -> ItemOption {
    ItemOption {
        value: Some(option.value.unwrap_or_default()),
        name: option.name,
    }
}

/// Convert package dimensions to centimeters.
///
/// Returns `None` when any axis is missing or not positive after rounding;
/// ShipStation rejects zero dimensions.
fn to_centimeters(dimensions: &Dimensions) -> Option<Dimensions> {
    let inches = dimensions
        .units
        .as_deref()
        .is_some_and(|u| matches!(u.to_ascii_lowercase().as_str(), "inches" | "inch" | "in"));
    let factor = if inches { CM_PER_INCH } else { 1.0 };

    let convert = |value: Option<f64>| {
        value
            .map(|v| round2(v * factor))
            .filter(|v| *v > 0.0)
    };

    Some(Dimensions {
        units: if inches {
            Some("centimeters".to_string())
        } else {
            dimensions.units.clone()
        },
        length: Some(convert(dimensions.length)?),
        width: Some(convert(dimensions.width)?),
        height: Some(convert(dimensions.height)?),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn append_note(existing: Option<&str>, note: &str) -> String {
    let note = sanitize(note);
    let combined = match existing.map(str::trim).filter(|e| !e.is_empty()) {
        Some(existing) => format!("{existing}\n\n{note}"),
        None => note,
    };

    if combined.chars().count() <= INTERNAL_NOTES_MAX {
        return combined;
    }
    let keep = INTERNAL_NOTES_MAX - TRUNCATION_MARKER.len();
    let mut truncated = truncate_chars(&combined, keep);
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Normalize line endings and drop control characters other than newline
/// and tab.
fn sanitize(note: &str) -> String {
    note.replace("\r\n", "\n")
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::shipstation::{ListOrdersParams, OrdersPage, ShipStationError, Tag};

    fn order_fixture(status: &str) -> Order {
        serde_json::from_value(json!({
            "orderId": 555,
            "orderNumber": "114-0000001-0000001",
            "orderStatus": status,
            "customerNotes": "Please hurry",
            "internalNotes": "Called customer",
            "dimensions": { "units": "inches", "length": 10.0, "width": 5.0, "height": 2.0 },
            "items": [
                {
                    "lineItemKey": "li-1",
                    "quantity": 1,
                    "options": [{ "name": "Gift Wrap", "value": null }]
                },
                {
                    "lineItemKey": "li-2",
                    "quantity": 2,
                    "options": [{ "name": "Size", "value": "L" }]
                }
            ]
        }))
        .unwrap()
    }

    fn text_patch(key: &str, text: &str) -> ItemOptionsPatch {
        let mut patch = ItemOptionsPatch::new();
        patch.insert(key.to_string(), vec![ItemOption::new("Name or Text", text)]);
        patch
    }

    #[test]
    fn test_inch_dimensions_converted_to_centimeters() {
        let patched = build_patched_order(&order_fixture("awaiting_shipment"), &ItemOptionsPatch::new(), None);
        let dims = patched.dimensions.unwrap();
        assert_eq!(dims.units.as_deref(), Some("centimeters"));
        assert_eq!(dims.length, Some(25.4));
        assert_eq!(dims.width, Some(12.7));
        assert_eq!(dims.height, Some(5.08));
    }

    #[test]
    fn test_non_inch_dimensions_keep_their_units() {
        let mut order = order_fixture("awaiting_shipment");
        order.dimensions = Some(Dimensions {
            units: Some("centimeters".to_string()),
            length: Some(20.004),
            width: Some(10.0),
            height: Some(3.456),
        });
        let dims = build_patched_order(&order, &ItemOptionsPatch::new(), None)
            .dimensions
            .unwrap();
        assert_eq!(dims.units.as_deref(), Some("centimeters"));
        assert_eq!(dims.length, Some(20.0));
        assert_eq!(dims.width, Some(10.0));
        assert_eq!(dims.height, Some(3.46));
    }

    #[test]
    fn test_dimensions_dropped_when_an_axis_rounds_to_zero() {
        let mut order = order_fixture("awaiting_shipment");
        order.dimensions = Some(Dimensions {
            units: Some("inches".to_string()),
            length: Some(10.0),
            width: Some(0.001),
            height: Some(2.0),
        });
        assert_eq!(build_patched_order(&order, &ItemOptionsPatch::new(), None).dimensions, None);
    }

    #[test]
    fn test_only_targeted_items_replaced_and_nulls_emptied() {
        let patched = build_patched_order(
            &order_fixture("awaiting_shipment"),
            &text_patch("li-2", "HELLO"),
            None,
        );
        assert_eq!(patched.items[0].options, vec![ItemOption::new("Gift Wrap", "")]);
        assert_eq!(patched.items[1].options, vec![ItemOption::new("Name or Text", "HELLO")]);
        assert_eq!(patched.customer_notes, None);
        assert_eq!(patched.internal_notes.as_deref(), Some("Called customer"));
    }

    #[test]
    fn test_audit_note_appended_and_truncated() {
        let note = "n".repeat(1200);
        let patched = build_patched_order(
            &order_fixture("awaiting_shipment"),
            &ItemOptionsPatch::new(),
            Some(&note),
        );
        let notes = patched.internal_notes.unwrap();
        assert!(notes.starts_with("Called customer\n\n"));
        assert!(notes.ends_with("... [truncated]"));
        assert_eq!(notes.chars().count(), INTERNAL_NOTES_MAX);
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize("a\r\nb\u{7}c\td"), "a\nbc\td");
    }

    struct FakeApi {
        order: Order,
        fail_update: bool,
        updates: Mutex<Vec<Order>>,
    }

    #[async_trait]
    impl OrderApi for FakeApi {
        async fn list_orders(&self, _: &ListOrdersParams) -> Result<OrdersPage, ShipStationError> {
            Ok(OrdersPage::single(self.order.clone()))
        }

        async fn get_order(&self, _: i64) -> Result<OrdersPage, ShipStationError> {
            Ok(OrdersPage::single(self.order.clone()))
        }

        async fn list_tags(&self) -> Result<Vec<Tag>, ShipStationError> {
            Ok(Vec::new())
        }

        async fn update_order(&self, order: &Order) -> Result<(), ShipStationError> {
            if self.fail_update {
                return Err(ShipStationError::Api {
                    status: 400,
                    body: "bad request".to_string(),
                });
            }
            self.updates.lock().unwrap().push(order.clone());
            Ok(())
        }
    }

    fn fake(status: &str, fail_update: bool) -> FakeApi {
        FakeApi {
            order: order_fixture(status),
            fail_update,
            updates: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_batch_patch_posts_merged_order() {
        let api = fake("awaiting_shipment", false);
        let snapshot = order_fixture("awaiting_shipment");

        let outcome = api
            .patch_item_options_batch(&snapshot, &text_patch("li-1", "HELLO"), Some("Task sync"))
            .await;

        assert_eq!(outcome, PatchOutcome::Updated { items: 1 });
        let updates = api.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].internal_notes.as_deref().unwrap().ends_with("Task sync"));
    }

    #[tokio::test]
    async fn test_single_patch_reports_bool() {
        let api = fake("awaiting_shipment", false);
        let snapshot = order_fixture("awaiting_shipment");
        assert!(
            api.patch_item_options("li-2", vec![ItemOption::new("Colour 1", "Red")], &snapshot)
                .await
        );
    }

    #[tokio::test]
    async fn test_closed_order_is_skipped() {
        let api = fake("shipped", false);
        let outcome = apply_batch(&api, 555, &text_patch("li-1", "X"), None).await;
        assert!(matches!(outcome, PatchOutcome::Skipped(_)));
        assert!(api.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_line_item_fails_without_update() {
        let api = fake("awaiting_shipment", false);
        let outcome = apply_batch(&api, 555, &text_patch("li-9", "X"), None).await;
        assert!(matches!(outcome, PatchOutcome::Failed(_)));
        assert!(api.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_error_becomes_failed_outcome() {
        let api = fake("awaiting_shipment", true);
        let outcome = apply_batch(&api, 555, &text_patch("li-1", "X"), None).await;
        assert!(matches!(outcome, PatchOutcome::Failed(ref reason) if reason.contains("400")));
    }
}
