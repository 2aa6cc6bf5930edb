//! Print task domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printline_core::{CustomerId, OrderId, OrderItemId, PrintTaskId, PrintTaskStatus, ProductId};

/// Maximum stored length of a task's shorthand product name.
pub const SHORTHAND_NAME_MAX: usize = 100;

/// Maximum stored length of a review reason.
pub const REVIEW_REASON_MAX: usize = 1000;

/// One manufacturing work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintTask {
    /// Unique task ID.
    pub id: PrintTaskId,
    /// Order the task belongs to.
    pub order_id: OrderId,
    /// Line item the task was derived from.
    pub order_item_id: OrderItemId,
    /// Position among the item's personalizations, dense from 0.
    pub task_index: i32,
    /// Product being printed.
    pub product_id: ProductId,
    /// Customer, if the order was linked to one.
    pub customer_id: Option<CustomerId>,
    /// Product name truncated for queue display.
    pub shorthand_product_name: Option<String>,
    /// Marketplace order number for the packing bench.
    pub marketplace_order_number: Option<String>,
    /// Text to print.
    pub custom_text: Option<String>,
    /// Primary color.
    pub color_1: Option<String>,
    /// Secondary color.
    pub color_2: Option<String>,
    /// Units for this personalization.
    pub quantity: i32,
    /// Queue status.
    pub status: PrintTaskStatus,
    /// Whether a human must check this task before printing.
    pub needs_review: bool,
    /// Why the task needs review.
    pub review_reason: Option<String>,
    /// Provenance note, e.g. "Data from Amazon CustomizedURL".
    pub annotation: Option<String>,
    /// Ship-by date copied from the order.
    pub ship_by_date: Option<DateTime<Utc>>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Fields set only when a task is first created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskLinkage {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub customer_id: Option<CustomerId>,
    pub shorthand_product_name: Option<String>,
    pub marketplace_order_number: Option<String>,
}

/// Fields refreshed on every upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFields {
    pub custom_text: Option<String>,
    pub color_1: Option<String>,
    pub color_2: Option<String>,
    pub quantity: i32,
    pub status: PrintTaskStatus,
    pub needs_review: bool,
    pub review_reason: Option<String>,
    pub annotation: Option<String>,
    pub ship_by_date: Option<DateTime<Utc>>,
}

/// An idempotent write keyed by `(order_item_id, task_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskUpsert {
    pub order_item_id: OrderItemId,
    pub task_index: i32,
    pub linkage: TaskLinkage,
    pub fields: TaskFields,
}

/// Result of persisting one order's tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Tasks removed before the upserts (force recreate only).
    pub deleted: u64,
    /// Stored tasks, in the order the upserts were given.
    pub tasks: Vec<PrintTask>,
}

/// Truncate to at most `max` characters without splitting a code point.
#[must_use]
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Join review reasons with `; `, dropping blanks and repeats.
///
/// Returns `None` when nothing is left.
#[must_use]
pub fn join_review_reasons<'a, I>(reasons: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: Vec<&str> = Vec::new();
    for reason in reasons {
        let reason = reason.trim();
        if !reason.is_empty() && !seen.contains(&reason) {
            seen.push(reason);
        }
    }
    if seen.is_empty() {
        return None;
    }
    Some(truncate_chars(&seen.join("; "), REVIEW_REASON_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_reasons_deduped_in_order() {
        let joined = join_review_reasons(["Qty Mismatch", " ", "Unclear text", "Qty Mismatch"]);
        assert_eq!(joined.as_deref(), Some("Qty Mismatch; Unclear text"));
    }

    #[test]
    fn test_review_reasons_empty() {
        assert_eq!(join_review_reasons(["", "  "]), None);
    }

    #[test]
    fn test_review_reasons_truncated() {
        let long = "x".repeat(1200);
        let joined = join_review_reasons([long.as_str()]).unwrap_or_default();
        assert_eq!(joined.chars().count(), REVIEW_REASON_MAX);
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
