//! Status enums for orders, print tasks and sync runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing a status string fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Order status as reported by ShipStation.
///
/// Stored as text so that a new upstream status never breaks a sync run;
/// anything unrecognised lands in [`OrderStatus::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    AwaitingPayment,
    #[default]
    AwaitingShipment,
    PendingFulfillment,
    OnHold,
    Shipped,
    Cancelled,
    RejectedFulfillment,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Orders in this status are picked up by the print queue.
    #[must_use]
    pub const fn is_queue_eligible(self) -> bool {
        matches!(self, Self::AwaitingShipment)
    }

    /// Terminal statuses close out any open print tasks.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Shipped | Self::Cancelled)
    }

    /// Whether moving from `previous` to `self` should auto-complete open tasks.
    ///
    /// Only a real transition counts, and only out of a status where work
    /// was still expected to happen.
    #[must_use]
    pub fn completes_tasks_from(self, previous: Option<Self>) -> bool {
        let Some(previous) = previous else {
            return false;
        };
        self.is_terminal()
            && previous != self
            && matches!(previous, Self::AwaitingShipment | Self::OnHold)
    }

    /// The wire/database string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingPayment => "awaiting_payment",
            Self::AwaitingShipment => "awaiting_shipment",
            Self::PendingFulfillment => "pending_fulfillment",
            Self::OnHold => "on_hold",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
            Self::RejectedFulfillment => "rejected_fulfillment",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_payment" => Ok(Self::AwaitingPayment),
            // older rows used the misspelled variant
            "awaiting_shipment" | "awaiting_shipping" => Ok(Self::AwaitingShipment),
            "pending_fulfillment" => Ok(Self::PendingFulfillment),
            "on_hold" => Ok(Self::OnHold),
            "shipped" => Ok(Self::Shipped),
            "cancelled" => Ok(Self::Cancelled),
            "rejected_fulfillment" => Ok(Self::RejectedFulfillment),
            "unknown" => Ok(Self::Unknown),
            _ => Err(ParseStatusError::new("order status", s)),
        }
    }
}

/// Lifecycle of a print task in the manufacturing queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "printline.print_task_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PrintTaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl PrintTaskStatus {
    /// Tasks that still need work and can be auto-completed.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl std::fmt::Display for PrintTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for PrintTaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError::new("print task status", s)),
        }
    }
}

/// Kind of ShipStation sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "printline.sync_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Checkpoint-driven sync of everything modified since the last run.
    Full,
    /// Fixed look-back window.
    Recent,
    /// One order by external ID.
    Single,
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Recent => write!(f, "recent"),
            Self::Single => write!(f, "single"),
        }
    }
}

/// State of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "printline.sync_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Where a print task's personalization came from.
///
/// The string forms appear in audit notes and debug traces, so they are
/// kept stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSource {
    /// Downloaded customization archive (Amazon `CustomizedURL`).
    #[serde(rename = "AmazonURL")]
    CustomizationFile,
    /// Parsed from the buyer's order note (eBay).
    #[serde(rename = "CustomerNotes")]
    CustomerNote,
    /// Extracted by the AI model.
    #[serde(rename = "AI_Direct")]
    Ai,
    /// Nothing could be resolved; a review placeholder was created.
    #[serde(rename = "Placeholder")]
    Placeholder,
}

impl DataSource {
    /// Deterministic sources either succeed with confidence or cleanly miss.
    #[must_use]
    pub const fn is_deterministic(self) -> bool {
        matches!(self, Self::CustomizationFile | Self::CustomerNote)
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CustomizationFile => write!(f, "AmazonURL"),
            Self::CustomerNote => write!(f, "CustomerNotes"),
            Self::Ai => write!(f, "AI_Direct"),
            Self::Placeholder => write!(f, "Placeholder"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_parses_wire_values() {
        assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert_eq!(
            "awaiting_shipping".parse::<OrderStatus>(),
            Ok(OrderStatus::AwaitingShipment)
        );
        assert!("bogus".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_status_unknown_on_deserialize() {
        let status: OrderStatus = serde_json::from_str("\"lost_in_space\"").expect("deserialize");
        assert_eq!(status, OrderStatus::Unknown);
    }

    #[test]
    fn test_completes_tasks_only_on_real_transition() {
        use OrderStatus::{AwaitingPayment, AwaitingShipment, Cancelled, OnHold, Shipped};

        assert!(Shipped.completes_tasks_from(Some(AwaitingShipment)));
        assert!(Cancelled.completes_tasks_from(Some(OnHold)));
        assert!(!Shipped.completes_tasks_from(Some(Shipped)));
        assert!(!Shipped.completes_tasks_from(Some(AwaitingPayment)));
        assert!(!Shipped.completes_tasks_from(None));
        assert!(!AwaitingShipment.completes_tasks_from(Some(OnHold)));
    }

    #[test]
    fn test_print_task_status_roundtrip() {
        for status in [
            PrintTaskStatus::Pending,
            PrintTaskStatus::InProgress,
            PrintTaskStatus::Completed,
            PrintTaskStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<PrintTaskStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_open_task_statuses() {
        assert!(PrintTaskStatus::Pending.is_open());
        assert!(PrintTaskStatus::InProgress.is_open());
        assert!(!PrintTaskStatus::Completed.is_open());
        assert!(!PrintTaskStatus::Failed.is_open());
    }

    #[test]
    fn test_data_source_labels() {
        assert_eq!(DataSource::CustomizationFile.to_string(), "AmazonURL");
        assert_eq!(
            serde_json::to_string(&DataSource::Ai).expect("serialize"),
            "\"AI_Direct\""
        );
        assert!(DataSource::CustomerNote.is_deterministic());
        assert!(!DataSource::Placeholder.is_deterministic());
    }
}
