//! ShipStation wire types.
//!
//! Only the fields the engine reads are typed. Everything else is kept in
//! `extra` so an order fetched from the API can be posted back unchanged
//! apart from the fields we patch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Page size used for every list call.
pub const PAGE_SIZE: u32 = 100;

/// A ShipStation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: i64,
    pub order_number: String,
    pub order_key: Option<String>,
    pub order_date: Option<String>,
    pub create_date: Option<String>,
    pub modify_date: Option<String>,
    pub payment_date: Option<String>,
    pub ship_by_date: Option<String>,
    /// Raw status string; kept as text so it round-trips exactly.
    pub order_status: String,
    pub customer_id: Option<i64>,
    pub customer_username: Option<String>,
    pub customer_email: Option<String>,
    pub bill_to: Option<Address>,
    pub ship_to: Option<Address>,
    #[serde(default)]
    pub items: Vec<Item>,
    pub order_total: Option<f64>,
    pub amount_paid: Option<f64>,
    pub tax_amount: Option<f64>,
    pub shipping_amount: Option<f64>,
    pub customer_notes: Option<String>,
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub gift: bool,
    pub gift_message: Option<String>,
    pub payment_method: Option<String>,
    pub requested_shipping_service: Option<String>,
    pub carrier_code: Option<String>,
    pub service_code: Option<String>,
    pub package_code: Option<String>,
    pub confirmation: Option<String>,
    pub ship_date: Option<String>,
    pub weight: Option<Weight>,
    pub dimensions: Option<Dimensions>,
    pub advanced_options: Option<AdvancedOptions>,
    pub tag_ids: Option<Vec<i64>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Order {
    /// Marketplace label from `advancedOptions.source`.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.advanced_options
            .as_ref()
            .and_then(|o| o.source.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// A line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub order_item_id: Option<i64>,
    pub line_item_key: Option<String>,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub weight: Option<Weight>,
    #[serde(default)]
    pub quantity: i32,
    pub unit_price: Option<f64>,
    pub tax_amount: Option<f64>,
    pub shipping_amount: Option<f64>,
    pub warehouse_location: Option<String>,
    #[serde(default)]
    pub options: Vec<ItemOption>,
    pub product_id: Option<i64>,
    pub fulfillment_sku: Option<String>,
    #[serde(default)]
    pub adjustment: bool,
    pub upc: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A name/value item option. ShipStation rejects `null` values on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOption {
    pub name: String,
    pub value: Option<String>,
}

impl ItemOption {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub name: Option<String>,
    pub company: Option<String>,
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub street3: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub residential: Option<bool>,
    pub address_verified: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weight {
    pub value: Option<f64>,
    pub units: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub units: Option<String>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedOptions {
    pub warehouse_id: Option<i64>,
    pub store_id: Option<i64>,
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `GET /orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersPage {
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub pages: i64,
}

impl OrdersPage {
    /// Wrap one order as a one-page result.
    #[must_use]
    pub fn single(order: Order) -> Self {
        Self {
            orders: vec![order],
            total: 1,
            page: 1,
            pages: 1,
        }
    }
}

/// A tag from `GET /accounts/listtags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub tag_id: i64,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    ModifyDate,
    OrderDate,
}

impl SortBy {
    const fn as_str(self) -> &'static str {
        match self {
            Self::ModifyDate => "ModifyDate",
            Self::OrderDate => "OrderDate",
        }
    }
}

/// Query parameters for `GET /orders`. Dates are ShipStation-local
/// (US Pacific) `YYYY-MM-DD HH:MM:SS` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOrdersParams {
    pub order_status: Option<String>,
    pub modify_date_start: Option<String>,
    pub order_date_start: Option<String>,
    pub order_date_end: Option<String>,
    pub sort_by: SortBy,
    pub page: u32,
    pub page_size: u32,
}

impl Default for ListOrdersParams {
    fn default() -> Self {
        Self {
            order_status: None,
            modify_date_start: None,
            order_date_start: None,
            order_date_end: None,
            sort_by: SortBy::default(),
            page: 1,
            page_size: PAGE_SIZE,
        }
    }
}

impl ListOrdersParams {
    /// Append these parameters to `url`'s query string.
    pub fn apply_to(&self, url: &mut Url) {
        let mut query = url.query_pairs_mut();
        if let Some(status) = &self.order_status {
            query.append_pair("orderStatus", status);
        }
        if let Some(start) = &self.modify_date_start {
            query.append_pair("modifyDateStart", start);
        }
        if let Some(start) = &self.order_date_start {
            query.append_pair("orderDateStart", start);
        }
        if let Some(end) = &self.order_date_end {
            query.append_pair("orderDateEnd", end);
        }
        query
            .append_pair("sortBy", self.sort_by.as_str())
            .append_pair("sortDir", "ASC")
            .append_pair("page", &self.page.to_string())
            .append_pair("pageSize", &self.page_size.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_preserves_unknown_fields() {
        let raw = serde_json::json!({
            "orderId": 42,
            "orderNumber": "1001",
            "orderStatus": "awaiting_shipment",
            "items": [],
            "insuranceOptions": { "provider": "carrier" }
        });
        let order: Order = serde_json::from_value(raw).expect("order");
        assert_eq!(order.order_id, 42);
        assert!(order.extra.contains_key("insuranceOptions"));

        let back = serde_json::to_value(&order).expect("serialize");
        assert_eq!(back["insuranceOptions"]["provider"], "carrier");
    }

    #[test]
    fn test_list_params_query_string() {
        let mut url = Url::parse("https://ssapi.shipstation.com/orders").expect("url");
        ListOrdersParams {
            order_status: Some("awaiting_shipment".to_string()),
            modify_date_start: Some("2024-01-01 00:00:00".to_string()),
            page: 3,
            ..ListOrdersParams::default()
        }
        .apply_to(&mut url);

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("orderStatus".into(), "awaiting_shipment".into())));
        assert!(pairs.contains(&("modifyDateStart".into(), "2024-01-01 00:00:00".into())));
        assert!(pairs.contains(&("sortBy".into(), "ModifyDate".into())));
        assert!(pairs.contains(&("page".into(), "3".into())));
        assert!(pairs.contains(&("pageSize".into(), "100".into())));
    }

    #[test]
    fn test_single_page_wrapper() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "orderId": 1, "orderNumber": "A", "orderStatus": "shipped"
        }))
        .expect("order");
        let page = OrdersPage::single(order);
        assert_eq!((page.page, page.pages, page.total), (1, 1, 1));
    }
}
