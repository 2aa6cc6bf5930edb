//! ShipStation order payloads mapped onto the local models.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::Los_Angeles;
use rust_decimal::Decimal;

use printline_core::OrderStatus;

use crate::models::{
    CustomerAddress, ItemSyncError, NewCustomer, NewOrder, NewOrderItem, NewProduct,
    PrintSetting, PrintSettings,
};
use crate::shipstation::{Address, Item, Order};

/// Product name stored when ShipStation sends none.
pub const MISSING_PRODUCT_NAME: &str = "Product Needs Name";

/// Customer name stored when no address or username has one.
pub const UNKNOWN_CUSTOMER_NAME: &str = "Unknown Customer";

const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a ShipStation timestamp.
///
/// ShipStation sends wall-clock US Pacific time without an offset. Values
/// that do carry an offset are taken as-is.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok());
    let Some(naive) = naive else {
        tracing::warn!(raw, "Unparseable ShipStation timestamp");
        return None;
    };
    // `earliest` picks the first instant when the clock falls back in November
    Los_Angeles
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Format a UTC instant as a Pacific wall-clock query parameter.
#[must_use]
pub fn format_query_timestamp(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&Los_Angeles)
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

fn timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(parse_timestamp)
}

fn decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(|v| Decimal::try_from(v).ok()).map(|d| d.normalize())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Display name for the buyer.
#[must_use]
pub fn customer_name(order: &Order) -> String {
    let from_address = |address: Option<&Address>| non_blank(address.and_then(|a| a.name.as_deref()));
    from_address(order.ship_to.as_ref())
        .or_else(|| from_address(order.bill_to.as_ref()))
        .or_else(|| non_blank(order.customer_username.as_deref()))
        .unwrap_or_else(|| UNKNOWN_CUSTOMER_NAME.to_string())
}

/// Customer keyed by email; `None` when the order carries no email.
#[must_use]
pub fn map_customer(order: &Order) -> Option<NewCustomer> {
    let email = non_blank(order.customer_email.as_deref())?;
    Some(NewCustomer {
        email,
        name: customer_name(order),
        shipstation_customer_id: order.customer_id.map(|id| id.to_string()),
        address: order.ship_to.as_ref().map(map_address),
    })
}

fn map_address(address: &Address) -> CustomerAddress {
    CustomerAddress {
        company: non_blank(address.company.as_deref()),
        street1: non_blank(address.street1.as_deref()),
        street2: non_blank(address.street2.as_deref()),
        street3: non_blank(address.street3.as_deref()),
        city: non_blank(address.city.as_deref()),
        state: non_blank(address.state.as_deref()),
        postal_code: non_blank(address.postal_code.as_deref()),
        country_code: non_blank(address.country.as_deref()),
        phone: non_blank(address.phone.as_deref()),
        is_residential: address.residential,
        address_verified_status: address.address_verified.clone(),
    }
}

/// Order row fields.
#[must_use]
pub fn map_order(order: &Order) -> NewOrder {
    let status = order.order_status.parse().unwrap_or_else(|_| {
        tracing::warn!(status = %order.order_status, order_number = %order.order_number, "Unknown order status");
        OrderStatus::Unknown
    });
    let advanced = order.advanced_options.as_ref();
    let dimensions = order.dimensions.as_ref();

    NewOrder {
        shipstation_order_id: order.order_id,
        shipstation_order_number: order.order_number.clone(),
        order_key: order.order_key.clone(),
        order_status: status,
        marketplace: order.source().map(str::to_owned),
        customer_name: Some(customer_name(order)),
        order_date: timestamp(order.order_date.as_deref()),
        payment_date: timestamp(order.payment_date.as_deref()),
        ship_by_date: timestamp(order.ship_by_date.as_deref()),
        shipped_date: timestamp(order.ship_date.as_deref()),
        shipstation_modified_at: timestamp(order.modify_date.as_deref()),
        order_total: decimal(order.order_total),
        amount_paid: decimal(order.amount_paid),
        tax_amount: decimal(order.tax_amount),
        shipping_amount: decimal(order.shipping_amount),
        customer_notes: order.customer_notes.clone(),
        internal_notes: order.internal_notes.clone(),
        gift: order.gift,
        gift_message: order.gift_message.clone(),
        payment_method: order.payment_method.clone(),
        requested_shipping_service: order.requested_shipping_service.clone(),
        carrier_code: order.carrier_code.clone(),
        service_code: order.service_code.clone(),
        package_code: order.package_code.clone(),
        confirmation: order.confirmation.clone(),
        warehouse_id: advanced.and_then(|a| a.warehouse_id).map(|id| id.to_string()),
        store_id: advanced.and_then(|a| a.store_id),
        weight_value: decimal(order.weight.as_ref().and_then(|w| w.value)),
        weight_units: order.weight.as_ref().and_then(|w| w.units.clone()),
        dimensions_units: dimensions.and_then(|d| d.units.clone()),
        dimensions_length: decimal(dimensions.and_then(|d| d.length)),
        dimensions_width: decimal(dimensions.and_then(|d| d.width)),
        dimensions_height: decimal(dimensions.and_then(|d| d.height)),
        tag_ids: order.tag_ids.clone().unwrap_or_default(),
    }
}

/// Product fields for a line item.
#[must_use]
pub fn map_product(item: &Item) -> NewProduct {
    NewProduct {
        sku: non_blank(item.sku.as_deref()),
        shipstation_product_id: item.product_id,
        name: non_blank(item.name.as_deref()).unwrap_or_else(|| MISSING_PRODUCT_NAME.to_string()),
        image_url: item.image_url.clone(),
        weight_value: decimal(item.weight.as_ref().and_then(|w| w.value)),
        weight_units: item.weight.as_ref().and_then(|w| w.units.clone()),
        warehouse_location: item.warehouse_location.clone(),
        fulfillment_sku: item.fulfillment_sku.clone(),
        upc: item.upc.clone(),
    }
}

/// Line items to store, plus the ones skipped for lacking a line item key.
///
/// Adjustment lines (discounts, fees) are dropped silently.
#[must_use]
pub fn map_items(order: &Order) -> (Vec<NewOrderItem>, Vec<ItemSyncError>) {
    let mut items = Vec::new();
    let mut skipped = Vec::new();

    for item in order.items.iter().filter(|item| !item.adjustment) {
        let Some(key) = non_blank(item.line_item_key.as_deref()) else {
            skipped.push(ItemSyncError {
                item: item
                    .order_item_id
                    .map_or_else(|| "unknown".to_string(), |id| id.to_string()),
                error: format!(
                    "Skipping incoming item due to missing lineItemKey. SKU: {}, Name: {}",
                    item.sku.as_deref().unwrap_or("N/A"),
                    item.name.as_deref().unwrap_or("N/A")
                ),
            });
            continue;
        };

        items.push(NewOrderItem {
            shipstation_line_item_key: key,
            product: map_product(item),
            quantity: item.quantity,
            unit_price: decimal(item.unit_price).unwrap_or_default(),
            print_settings: item_settings(item),
        });
    }

    (items, skipped)
}

fn item_settings(item: &Item) -> PrintSettings {
    PrintSettings::new(
        item.options
            .iter()
            .filter_map(|option| {
                option.value.as_ref().map(|value| PrintSetting {
                    name: option.name.clone(),
                    value: value.clone(),
                })
            })
            .collect(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn order(value: serde_json::Value) -> Order {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_pacific_timestamps_convert_to_utc() {
        // PDT, UTC-7
        assert_eq!(
            parse_timestamp("2024-07-01T10:00:00.0000000").unwrap().to_rfc3339(),
            "2024-07-01T17:00:00+00:00"
        );
        // PST, UTC-8
        assert_eq!(
            parse_timestamp("2024-01-15 08:30:00").unwrap().to_rfc3339(),
            "2024-01-15T16:30:00+00:00"
        );
        assert_eq!(
            parse_timestamp("2024-01-15T08:30:00Z").unwrap().to_rfc3339(),
            "2024-01-15T08:30:00+00:00"
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_query_timestamp_is_pacific_wall_clock() {
        let instant = parse_timestamp("2024-07-01T17:00:00.001Z").unwrap();
        assert_eq!(format_query_timestamp(instant), "2024-07-01 10:00:00.001");
    }

    #[test]
    fn test_map_order_fields() {
        let ss = order(json!({
            "orderId": 77,
            "orderNumber": "114-1234567-1234567",
            "orderStatus": "awaiting_shipment",
            "orderDate": "2024-01-15T08:30:00.0000000",
            "modifyDate": "2024-01-16T09:00:00.0000000",
            "orderTotal": 19.99,
            "gift": true,
            "tagIds": [5, 9],
            "shipTo": { "name": "  " },
            "billTo": { "name": "Billy" },
            "advancedOptions": { "source": "amazon", "warehouseId": 12, "storeId": 3 },
            "dimensions": { "units": "inches", "length": 10.0, "width": 5.0, "height": 2.0 }
        }));

        let mapped = map_order(&ss);
        assert_eq!(mapped.order_status, OrderStatus::AwaitingShipment);
        assert_eq!(mapped.marketplace.as_deref(), Some("amazon"));
        assert_eq!(mapped.customer_name.as_deref(), Some("Billy"));
        assert_eq!(mapped.order_total, Some(Decimal::new(1999, 2)));
        assert_eq!(mapped.warehouse_id.as_deref(), Some("12"));
        assert_eq!(mapped.store_id, Some(3));
        assert_eq!(mapped.tag_ids, vec![5, 9]);
        assert_eq!(mapped.dimensions_length, Some(Decimal::from(10)));
        assert_eq!(
            mapped.shipstation_modified_at.unwrap().to_rfc3339(),
            "2024-01-16T17:00:00+00:00"
        );
    }

    #[test]
    fn test_unknown_status_maps_to_unknown() {
        let ss = order(json!({ "orderId": 1, "orderNumber": "1", "orderStatus": "teleported" }));
        assert_eq!(map_order(&ss).order_status, OrderStatus::Unknown);
    }

    #[test]
    fn test_customer_requires_email() {
        let without = order(json!({ "orderId": 1, "orderNumber": "1", "orderStatus": "shipped" }));
        assert_eq!(map_customer(&without), None);

        let with = order(json!({
            "orderId": 1, "orderNumber": "1", "orderStatus": "shipped",
            "customerEmail": " ann@example.com ", "customerId": 555,
            "shipTo": { "name": "Ann", "street1": "1 Main St", "country": "US", "residential": true }
        }));
        let customer = map_customer(&with).unwrap();
        assert_eq!(customer.email, "ann@example.com");
        assert_eq!(customer.name, "Ann");
        assert_eq!(customer.shipstation_customer_id.as_deref(), Some("555"));
        let address = customer.address.unwrap();
        assert_eq!(address.country_code.as_deref(), Some("US"));
        assert_eq!(address.is_residential, Some(true));
    }

    #[test]
    fn test_items_skip_adjustments_and_missing_keys() {
        let ss = order(json!({
            "orderId": 1, "orderNumber": "1", "orderStatus": "awaiting_shipment",
            "items": [
                { "lineItemKey": "li-1", "sku": " KEY-1 ", "name": "", "quantity": 2, "unitPrice": 4.5,
                  "options": [ { "name": "Colour", "value": "Red" }, { "name": "Gift", "value": null } ] },
                { "lineItemKey": "li-2", "name": "Discount", "quantity": 1, "adjustment": true },
                { "orderItemId": 99, "sku": "KEY-2", "name": "Tag", "quantity": 1 }
            ]
        }));

        let (items, skipped) = map_items(&ss);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.shipstation_line_item_key, "li-1");
        assert_eq!(item.product.sku.as_deref(), Some("KEY-1"));
        assert_eq!(item.product.name, MISSING_PRODUCT_NAME);
        assert_eq!(item.unit_price, Decimal::new(45, 1));
        assert_eq!(item.print_settings.get("colour"), Some("Red"));
        assert_eq!(item.print_settings.get("gift"), None);

        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].item, "99");
        assert!(skipped[0].error.contains("missing lineItemKey"));
    }
}
