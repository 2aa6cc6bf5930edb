//! Sync run bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printline_core::{SyncProgressId, SyncStatus, SyncType};

/// One sync run and its checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Unique run ID.
    pub id: SyncProgressId,
    /// Kind of run.
    pub sync_type: SyncType,
    /// Current state.
    pub status: SyncStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished, if it has.
    pub ended_at: Option<DateTime<Utc>>,
    /// Orders reported by the first page.
    pub total_orders: i32,
    /// Orders stored successfully.
    pub processed_orders: i32,
    /// Orders that failed.
    pub failed_orders: i32,
    /// ShipStation ID of the last order handled.
    pub last_processed_order_id: Option<i64>,
    /// `modifyDate` of the last order handled.
    pub last_processed_timestamp: Option<DateTime<Utc>>,
    /// Failure message for failed runs.
    pub error: Option<String>,
}

/// Per-order checkpoint written after each order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderCheckpoint {
    pub shipstation_order_id: i64,
    pub modified_at: Option<DateTime<Utc>>,
    pub succeeded: bool,
}

/// A ShipStation tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub shipstation_tag_id: i64,
    pub name: String,
    pub color_hex: Option<String>,
}
