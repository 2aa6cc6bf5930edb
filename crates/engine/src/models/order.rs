//! Order, line item, product and customer models.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use printline_core::{CustomerId, OrderId, OrderItemId, OrderStatus, ProductId};

use super::print_settings::PrintSettings;

/// Amazon order numbers look like `123-1234567-1234567`.
static AMAZON_ORDER_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}-\d{7}-\d{7}$").expect("Invalid regex"));

/// A customer matched by email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Unique customer ID.
    pub id: CustomerId,
    /// Email address (natural key).
    pub email: String,
    /// Display name.
    pub name: String,
    /// ShipStation customer ID, if known.
    pub shipstation_customer_id: Option<String>,
    pub company: Option<String>,
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub street3: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
    pub is_residential: Option<bool>,
    pub address_verified_status: Option<String>,
    /// When the customer was created.
    pub created_at: DateTime<Utc>,
    /// When the customer was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A product, matched by SKU first and ShipStation product ID second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Trimmed SKU.
    pub sku: Option<String>,
    /// ShipStation product ID.
    pub shipstation_product_id: Option<i64>,
    /// Product name.
    pub name: String,
    pub image_url: Option<String>,
    pub weight_value: Option<Decimal>,
    pub weight_units: Option<String>,
    pub warehouse_location: Option<String>,
    pub fulfillment_sku: Option<String>,
    pub upc: Option<String>,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A locally stored order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Local order ID.
    pub id: OrderId,
    /// ShipStation numeric order ID.
    pub shipstation_order_id: i64,
    /// Marketplace order number shown to humans.
    pub shipstation_order_number: String,
    /// ShipStation order key.
    pub order_key: Option<String>,
    /// Current status.
    pub order_status: OrderStatus,
    /// Marketplace label (`advancedOptions.source`), e.g. "amazon".
    pub marketplace: Option<String>,
    /// Linked customer, if the order had an email.
    pub customer_id: Option<CustomerId>,
    /// Best-effort customer display name.
    pub customer_name: Option<String>,
    /// Buyer-entered note.
    pub customer_notes: Option<String>,
    /// Internal notes as last seen on ShipStation.
    pub internal_notes: Option<String>,
    pub order_date: Option<DateTime<Utc>>,
    pub ship_by_date: Option<DateTime<Utc>>,
    /// ShipStation `modifyDate`, used as the sync checkpoint.
    pub shipstation_modified_at: Option<DateTime<Utc>>,
    /// When the order row was created.
    pub created_at: DateTime<Utc>,
    /// When the order row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Orders whose personalization arrives as a downloadable archive.
    #[must_use]
    pub fn is_amazon(&self) -> bool {
        marketplace_contains(self.marketplace.as_deref(), "amazon")
            || AMAZON_ORDER_NUMBER.is_match(&self.shipstation_order_number)
    }

    /// Orders whose personalization is typed into the buyer note.
    #[must_use]
    pub fn is_ebay(&self) -> bool {
        marketplace_contains(self.marketplace.as_deref(), "ebay")
    }

    /// The customer note, if it has any non-whitespace content.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.customer_notes
            .as_deref()
            .filter(|n| !n.trim().is_empty())
    }
}

fn marketplace_contains(marketplace: Option<&str>, needle: &str) -> bool {
    marketplace.is_some_and(|m| m.to_lowercase().contains(needle))
}

/// A line item row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    /// Local item ID.
    pub id: OrderItemId,
    /// Owning order.
    pub order_id: OrderId,
    /// Product ordered.
    pub product_id: ProductId,
    /// ShipStation line item key, used for patch-back.
    pub shipstation_line_item_key: Option<String>,
    /// Ordered quantity.
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Normalized item options.
    pub print_settings: PrintSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item together with its product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub item: OrderItem,
    pub product: Product,
}

impl LineItem {
    #[must_use]
    pub fn sku(&self) -> &str {
        self.product.sku.as_deref().unwrap_or_default()
    }
}

/// An order with all of its line items loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<LineItem>,
}

// =============================================================================
// Sync inputs
// =============================================================================

/// Customer fields mapped from a ShipStation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub email: String,
    pub name: String,
    pub shipstation_customer_id: Option<String>,
    /// `None` when the order had no ship-to address; existing address
    /// fields are then left untouched.
    pub address: Option<CustomerAddress>,
}

/// Ship-to address copied onto the customer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerAddress {
    pub company: Option<String>,
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub street3: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
    pub is_residential: Option<bool>,
    pub address_verified_status: Option<String>,
}

/// Product fields mapped from a ShipStation line item.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub sku: Option<String>,
    pub shipstation_product_id: Option<i64>,
    pub name: String,
    pub image_url: Option<String>,
    pub weight_value: Option<Decimal>,
    pub weight_units: Option<String>,
    pub warehouse_location: Option<String>,
    pub fulfillment_sku: Option<String>,
    pub upc: Option<String>,
}

/// Order fields mapped from a ShipStation order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub shipstation_order_id: i64,
    pub shipstation_order_number: String,
    pub order_key: Option<String>,
    pub order_status: OrderStatus,
    pub marketplace: Option<String>,
    pub customer_name: Option<String>,
    pub order_date: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub ship_by_date: Option<DateTime<Utc>>,
    pub shipped_date: Option<DateTime<Utc>>,
    pub shipstation_modified_at: Option<DateTime<Utc>>,
    pub order_total: Option<Decimal>,
    pub amount_paid: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub shipping_amount: Option<Decimal>,
    pub customer_notes: Option<String>,
    pub internal_notes: Option<String>,
    pub gift: bool,
    pub gift_message: Option<String>,
    pub payment_method: Option<String>,
    pub requested_shipping_service: Option<String>,
    pub carrier_code: Option<String>,
    pub service_code: Option<String>,
    pub package_code: Option<String>,
    pub confirmation: Option<String>,
    pub warehouse_id: Option<String>,
    pub store_id: Option<i64>,
    pub weight_value: Option<Decimal>,
    pub weight_units: Option<String>,
    pub dimensions_units: Option<String>,
    pub dimensions_length: Option<Decimal>,
    pub dimensions_width: Option<Decimal>,
    pub dimensions_height: Option<Decimal>,
    pub tag_ids: Vec<i64>,
}

/// A line item to upsert by its ShipStation line item key.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub shipstation_line_item_key: String,
    pub product: NewProduct,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub print_settings: PrintSettings,
}

/// Everything written for one order in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpsert {
    pub order: NewOrder,
    pub customer_id: Option<CustomerId>,
    pub items: Vec<NewOrderItem>,
}

/// A line item that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSyncError {
    /// Line item key, or the ShipStation item ID when the key is missing.
    pub item: String,
    pub error: String,
}

/// What the store did for one order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderUpsertReport {
    pub order_id: Option<OrderId>,
    pub items_processed: usize,
    pub item_errors: Vec<ItemSyncError>,
    /// Print tasks closed because the order shipped or was cancelled.
    pub tasks_auto_completed: u64,
}
