//! ShipStation REST API client.
//!
//! # Architecture
//!
//! - Basic auth from API key and secret, one shared `reqwest::Client`
//! - Bounded retry on 429 and 5xx, honouring the server's reset header
//! - Item option patch-back re-fetches the order and posts the merged
//!   payload to `/orders/createorder`, ShipStation's upsert-by-order-key
//!
//! Callers depend on the [`OrderApi`] trait so tests can use a fake.

pub mod client;
pub mod patch;
pub mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

pub use client::ShipStationClient;
pub use patch::{PatchOutcome, build_patched_order};
pub use types::{
    Address, AdvancedOptions, Dimensions, Item, ItemOption, ListOrdersParams, Order, OrdersPage,
    SortBy, Tag, Weight,
};

/// Errors that can occur when interacting with the ShipStation API.
#[derive(Debug, Error)]
pub enum ShipStationError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the API.
    #[error("ShipStation API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Rate limited by ShipStation.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Client could not be constructed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ShipStationError {
    /// Whether the request may succeed if repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Http(_) | Self::Parse(_) | Self::NotFound(_) | Self::InvalidConfig(_) => false,
        }
    }
}

/// Options to write per line item key.
pub type ItemOptionsPatch = BTreeMap<String, Vec<ItemOption>>;

/// Operations the services need from the order API.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// One page of orders.
    async fn list_orders(&self, params: &ListOrdersParams) -> Result<OrdersPage, ShipStationError>;

    /// One order by ShipStation order ID, wrapped as a single page.
    async fn get_order(&self, order_id: i64) -> Result<OrdersPage, ShipStationError>;

    /// All account tags.
    async fn list_tags(&self) -> Result<Vec<Tag>, ShipStationError>;

    /// Create or update an order from a full payload.
    async fn update_order(&self, order: &Order) -> Result<(), ShipStationError>;

    /// Replace one line item's options. Never errors: failures are logged and
    /// reported as `false`.
    async fn patch_item_options(
        &self,
        line_item_key: &str,
        options: Vec<ItemOption>,
        snapshot: &Order,
    ) -> bool {
        let mut patch = ItemOptionsPatch::new();
        patch.insert(line_item_key.to_owned(), options);
        self.patch_item_options_batch(snapshot, &patch, None)
            .await
            .is_success()
    }

    /// Replace several line items' options in one update, appending an audit
    /// note to the internal notes.
    ///
    /// The order is re-fetched first; the snapshot only supplies its ID.
    /// Never errors: failures are logged and reported in the outcome.
    async fn patch_item_options_batch(
        &self,
        snapshot: &Order,
        patch: &ItemOptionsPatch,
        audit_note: Option<&str>,
    ) -> PatchOutcome {
        patch::apply_batch(self, snapshot.order_id, patch, audit_note).await
    }
}
