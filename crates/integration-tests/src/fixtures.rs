//! Orders, line items and archives for the scenarios.

use std::io::{Cursor, Write};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use printline_core::{OrderId, OrderItemId, OrderStatus, ProductId};
use printline_engine::ai::{AiExtractor, PromptSet};
use printline_engine::customization::CustomizationFileResolver;
use printline_engine::models::{LineItem, Order, OrderItem, OrderWithItems, PrintSettings, Product};
use printline_engine::services::Orchestrator;
use printline_engine::shipstation::Order as ShipStationOrder;

use crate::fakes::{FakeShipStation, MemoryStore, ScriptedModel, StaticArchives};

/// ShipStation order IDs are the local ID offset by this much.
pub const SHIPSTATION_ID_OFFSET: i64 = 9000;

/// The fakes wired into an orchestrator.
#[derive(Default)]
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub shipstation: Arc<FakeShipStation>,
    pub archives: Arc<StaticArchives>,
    pub model: Arc<ScriptedModel>,
}

impl Harness {
    #[must_use]
    pub fn orchestrator(&self) -> Orchestrator {
        let ai = AiExtractor::new(self.model.clone(), PromptSet::default());
        self.build(Some(ai))
    }

    /// An orchestrator with no AI configured.
    #[must_use]
    pub fn orchestrator_without_ai(&self) -> Orchestrator {
        self.build(None)
    }

    fn build(&self, ai: Option<AiExtractor>) -> Orchestrator {
        Orchestrator::new(
            self.store.clone(),
            self.shipstation.clone(),
            CustomizationFileResolver::new(self.archives.clone()),
            ai,
        )
    }
}

/// An order awaiting shipment.
#[must_use]
pub fn order(id: i32, number: &str, marketplace: Option<&str>) -> Order {
    let placed = Utc
        .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    Order {
        id: OrderId::new(id),
        shipstation_order_id: SHIPSTATION_ID_OFFSET + i64::from(id),
        shipstation_order_number: number.to_string(),
        order_key: Some(format!("key-{id}")),
        order_status: OrderStatus::AwaitingShipment,
        marketplace: marketplace.map(str::to_string),
        customer_id: None,
        customer_name: Some("Sam Buyer".to_string()),
        customer_notes: None,
        internal_notes: None,
        order_date: Some(placed),
        ship_by_date: Some(placed + chrono::TimeDelta::days(3)),
        shipstation_modified_at: Some(placed),
        created_at: placed,
        updated_at: placed,
    }
}

/// A line item; `settings` is a raw option payload as ShipStation sends it.
#[must_use]
pub fn line(order_id: i32, item_id: i32, key: &str, sku: &str, quantity: i32, settings: &Value) -> LineItem {
    let now = Utc::now();
    let product_id = ProductId::new(item_id + 100);
    LineItem {
        item: OrderItem {
            id: OrderItemId::new(item_id),
            order_id: OrderId::new(order_id),
            product_id,
            shipstation_line_item_key: Some(key.to_string()),
            quantity,
            unit_price: Decimal::new(1299, 2),
            print_settings: PrintSettings::from_json(settings),
            created_at: now,
            updated_at: now,
        },
        product: Product {
            id: product_id,
            sku: Some(sku.to_string()),
            shipstation_product_id: None,
            name: format!("Personalised Keyring {sku}"),
            image_url: None,
            weight_value: None,
            weight_units: None,
            warehouse_location: None,
            fulfillment_sku: None,
            upc: None,
            created_at: now,
            updated_at: now,
        },
    }
}

/// Option payload carrying a customization archive URL.
#[must_use]
pub fn customized_url(url: &str) -> Value {
    json!([{ "name": "CustomizedURL", "value": url }])
}

#[must_use]
pub fn with_items(order: Order, items: Vec<LineItem>) -> OrderWithItems {
    OrderWithItems { order, items }
}

/// The ShipStation side of a local order, with one API item per line item.
#[must_use]
pub fn shipstation_order(entry: &OrderWithItems, status: &str) -> ShipStationOrder {
    let items: Vec<Value> = entry
        .items
        .iter()
        .map(|line| {
            json!({
                "orderItemId": line.item.id.as_i32(),
                "lineItemKey": line.item.shipstation_line_item_key,
                "sku": line.product.sku,
                "name": line.product.name,
                "quantity": line.item.quantity,
                "options": [{ "name": "Size", "value": "Standard" }]
            })
        })
        .collect();
    serde_json::from_value(json!({
        "orderId": entry.order.shipstation_order_id,
        "orderNumber": entry.order.shipstation_order_number,
        "orderKey": entry.order.order_key,
        "orderStatus": status,
        "customerNotes": entry.order.customer_notes,
        "internalNotes": "Gift wrap",
        "items": items,
        "dimensions": { "units": "inches", "length": 4.0, "width": 3.0, "height": 1.0 },
        "advancedOptions": { "source": entry.order.marketplace }
    }))
    .expect("valid ShipStation order fixture")
}

/// A ShipStation order as the list endpoint returns it.
#[must_use]
pub fn listed_order(order_id: i64, number: &str, modified: &str, email: Option<&str>) -> ShipStationOrder {
    serde_json::from_value(json!({
        "orderId": order_id,
        "orderNumber": number,
        "orderKey": format!("key-{order_id}"),
        "orderDate": "2024-05-01T09:30:00.0000000",
        "modifyDate": modified,
        "orderStatus": "awaiting_shipment",
        "customerEmail": email,
        "customerUsername": "buyer",
        "shipTo": { "name": "Sam Buyer", "street1": "1 Main St", "city": "Leeds", "country": "GB" },
        "items": [{
            "orderItemId": order_id * 10,
            "lineItemKey": format!("li-{order_id}"),
            "sku": "KEY-RED",
            "name": "Keyring",
            "quantity": 1,
            "unitPrice": 9.99,
            "options": [{ "name": "Color", "value": "Red" }]
        }],
        "advancedOptions": { "source": "etsy", "storeId": 77 }
    }))
    .expect("valid listed order fixture")
}

/// A zip archive holding `entries` as `(name, contents)`.
#[must_use]
pub fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(contents.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// A customization archive whose manifest names `text` and two colors.
#[must_use]
pub fn customization_archive(text: &str, color_1: &str, color_2: &str) -> Vec<u8> {
    let manifest = json!({
        "customizationInfo": { "version3.0": { "surfaces": [{ "areas": [
            { "customizationType": "TextPrinting", "label": "Name", "text": text },
            { "customizationType": "Options", "label": "Colour 1", "optionValue": color_1 },
            { "customizationType": "Options", "label": "Colour 2", "optionValue": color_2 }
        ]}]}}
    })
    .to_string();
    zip_with(&[("customization.json", manifest.as_str())])
}

/// A model reply for one item with the given `(text, color, quantity)`
/// personalizations.
#[must_use]
pub fn ai_reply(key: &str, personalizations: &[(&str, &str, i32)]) -> String {
    let personalizations: Vec<Value> = personalizations
        .iter()
        .map(|(text, color, quantity)| {
            json!({
                "customText": text,
                "color1": color,
                "color2": null,
                "quantity": quantity,
                "needsReview": false,
                "reviewReason": null
            })
        })
        .collect();
    json!({
        "itemPersonalizations": {
            (key): {
                "personalizations": personalizations,
                "overallNeedsReview": false,
                "overallReviewReason": null
            }
        }
    })
    .to_string()
}
