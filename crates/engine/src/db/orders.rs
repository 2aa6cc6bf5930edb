//! Database operations for orders and their line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use printline_core::{CustomerId, OrderId, OrderItemId, OrderStatus, ProductId};

use super::RepositoryError;
use crate::models::{
    LineItem, NewOrder, NewOrderItem, Order, OrderItem, OrderWithItems, PrintSettings, Product,
};

const ORDER_COLUMNS: &str = r"
    id, shipstation_order_id, shipstation_order_number, order_key, order_status,
    marketplace, customer_id, customer_name, customer_notes, internal_notes,
    order_date, ship_by_date, shipstation_modified_at, created_at, updated_at
";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    shipstation_order_id: i64,
    shipstation_order_number: String,
    order_key: Option<String>,
    order_status: String,
    marketplace: Option<String>,
    customer_id: Option<i32>,
    customer_name: Option<String>,
    customer_notes: Option<String>,
    internal_notes: Option<String>,
    order_date: Option<DateTime<Utc>>,
    ship_by_date: Option<DateTime<Utc>>,
    shipstation_modified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            shipstation_order_id: row.shipstation_order_id,
            shipstation_order_number: row.shipstation_order_number,
            order_key: row.order_key,
            order_status: parse_status(&row.order_status),
            marketplace: row.marketplace,
            customer_id: row.customer_id.map(CustomerId::new),
            customer_name: row.customer_name,
            customer_notes: row.customer_notes,
            internal_notes: row.internal_notes,
            order_date: row.order_date,
            ship_by_date: row.ship_by_date,
            shipstation_modified_at: row.shipstation_modified_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Line item joined with its product.
#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    id: i32,
    order_id: i32,
    product_id: i32,
    shipstation_line_item_key: Option<String>,
    quantity: i32,
    unit_price: Decimal,
    print_settings: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    p_sku: Option<String>,
    p_shipstation_product_id: Option<i64>,
    p_name: String,
    p_image_url: Option<String>,
    p_weight_value: Option<Decimal>,
    p_weight_units: Option<String>,
    p_warehouse_location: Option<String>,
    p_fulfillment_sku: Option<String>,
    p_upc: Option<String>,
    p_created_at: DateTime<Utc>,
    p_updated_at: DateTime<Utc>,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        let product = Product {
            id: ProductId::new(row.product_id),
            sku: row.p_sku,
            shipstation_product_id: row.p_shipstation_product_id,
            name: row.p_name,
            image_url: row.p_image_url,
            weight_value: row.p_weight_value,
            weight_units: row.p_weight_units,
            warehouse_location: row.p_warehouse_location,
            fulfillment_sku: row.p_fulfillment_sku,
            upc: row.p_upc,
            created_at: row.p_created_at,
            updated_at: row.p_updated_at,
        };
        let item = OrderItem {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            shipstation_line_item_key: row.shipstation_line_item_key,
            quantity: row.quantity,
            unit_price: row.unit_price,
            print_settings: PrintSettings::from_json(&row.print_settings),
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        Self { item, product }
    }
}

fn parse_status(raw: &str) -> OrderStatus {
    raw.parse().unwrap_or_else(|_| {
        tracing::debug!(status = raw, "Unrecognised order status");
        OrderStatus::Unknown
    })
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order reads.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order with items by local ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_id(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM printline.orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        self.with_items(row).await
    }

    /// Get the most recent order with the given marketplace order number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM printline.orders
            WHERE shipstation_order_number = $1
            ORDER BY order_date DESC NULLS LAST
            LIMIT 1
            "
        ))
        .bind(order_number)
        .fetch_optional(self.pool)
        .await?;

        self.with_items(row).await
    }

    /// Get an order with items by ShipStation order ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_shipstation_id(
        &self,
        shipstation_order_id: i64,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM printline.orders WHERE shipstation_order_id = $1"
        ))
        .bind(shipstation_order_id)
        .fetch_optional(self.pool)
        .await?;

        self.with_items(row).await
    }

    /// Orders awaiting shipment, newest first.
    ///
    /// Unless `include_with_tasks` is set, only orders with at least one keyed
    /// line item that has no print tasks are returned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_processing(
        &self,
        limit: Option<i64>,
        include_with_tasks: bool,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM printline.orders o
            WHERE o.order_status = 'awaiting_shipment'
              AND ($2 OR EXISTS (
                  SELECT 1 FROM printline.order_items i
                  WHERE i.order_id = o.id
                    AND i.shipstation_line_item_key IS NOT NULL
                    AND NOT EXISTS (
                        SELECT 1 FROM printline.print_tasks t WHERE t.order_item_id = i.id
                    )
              ))
            ORDER BY o.order_date DESC NULLS LAST
            LIMIT $1
            "
        ))
        .bind(limit)
        .bind(include_with_tasks)
        .fetch_all(self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order: Order = row.into();
            let items = self.items_for_order(order.id).await?;
            orders.push(OrderWithItems { order, items });
        }
        Ok(orders)
    }

    /// Line items with products for one order, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<LineItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r"
            SELECT
                i.id, i.order_id, i.product_id, i.shipstation_line_item_key, i.quantity,
                i.unit_price, i.print_settings, i.created_at, i.updated_at,
                p.sku AS p_sku,
                p.shipstation_product_id AS p_shipstation_product_id,
                p.name AS p_name,
                p.image_url AS p_image_url,
                p.weight_value AS p_weight_value,
                p.weight_units AS p_weight_units,
                p.warehouse_location AS p_warehouse_location,
                p.fulfillment_sku AS p_fulfillment_sku,
                p.upc AS p_upc,
                p.created_at AS p_created_at,
                p.updated_at AS p_updated_at
            FROM printline.order_items i
            JOIN printline.products p ON p.id = i.product_id
            WHERE i.order_id = $1
            ORDER BY i.id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Latest ShipStation `modifyDate` stored locally.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_modification(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar(r"SELECT MAX(shipstation_modified_at) FROM printline.orders")
                .fetch_one(self.pool)
                .await?;
        Ok(latest)
    }

    /// Stored status for a ShipStation order, if the order is known.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status_by_shipstation_id(
        &self,
        shipstation_order_id: i64,
    ) -> Result<Option<OrderStatus>, RepositoryError> {
        let status: Option<String> = sqlx::query_scalar(
            r"SELECT order_status FROM printline.orders WHERE shipstation_order_id = $1",
        )
        .bind(shipstation_order_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(status.as_deref().map(parse_status))
    }

    async fn with_items(
        &self,
        row: Option<OrderRow>,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let order: Order = row.into();
        let items = self.items_for_order(order.id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }
}

// =============================================================================
// Transactional writes
// =============================================================================

/// Lock an existing order row and return its ID and status.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_existing(
    conn: &mut PgConnection,
    shipstation_order_id: i64,
) -> Result<Option<(OrderId, OrderStatus)>, RepositoryError> {
    let row: Option<(i32, String)> = sqlx::query_as(
        r"
        SELECT id, order_status FROM printline.orders
        WHERE shipstation_order_id = $1
        FOR UPDATE
        ",
    )
    .bind(shipstation_order_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(id, status)| (OrderId::new(id), parse_status(&status))))
}

/// Insert or update an order by ShipStation order ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn upsert(
    conn: &mut PgConnection,
    order: &NewOrder,
    customer_id: Option<CustomerId>,
) -> Result<OrderId, RepositoryError> {
    let id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO printline.orders (
            shipstation_order_id, shipstation_order_number, order_key, order_status,
            marketplace, customer_id, customer_name, order_date, payment_date,
            ship_by_date, shipped_date, shipstation_modified_at, order_total,
            amount_paid, tax_amount, shipping_amount, customer_notes, internal_notes,
            gift, gift_message, payment_method, requested_shipping_service,
            carrier_code, service_code, package_code, confirmation, warehouse_id,
            store_id, weight_value, weight_units, dimensions_units,
            dimensions_length, dimensions_width, dimensions_height, tag_ids
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
            $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
            $31, $32, $33, $34, $35
        )
        ON CONFLICT (shipstation_order_id) DO UPDATE SET
            shipstation_order_number = EXCLUDED.shipstation_order_number,
            order_key = EXCLUDED.order_key,
            order_status = EXCLUDED.order_status,
            marketplace = EXCLUDED.marketplace,
            customer_id = EXCLUDED.customer_id,
            customer_name = EXCLUDED.customer_name,
            order_date = EXCLUDED.order_date,
            payment_date = EXCLUDED.payment_date,
            ship_by_date = EXCLUDED.ship_by_date,
            shipped_date = EXCLUDED.shipped_date,
            shipstation_modified_at = EXCLUDED.shipstation_modified_at,
            order_total = EXCLUDED.order_total,
            amount_paid = EXCLUDED.amount_paid,
            tax_amount = EXCLUDED.tax_amount,
            shipping_amount = EXCLUDED.shipping_amount,
            customer_notes = EXCLUDED.customer_notes,
            internal_notes = EXCLUDED.internal_notes,
            gift = EXCLUDED.gift,
            gift_message = EXCLUDED.gift_message,
            payment_method = EXCLUDED.payment_method,
            requested_shipping_service = EXCLUDED.requested_shipping_service,
            carrier_code = EXCLUDED.carrier_code,
            service_code = EXCLUDED.service_code,
            package_code = EXCLUDED.package_code,
            confirmation = EXCLUDED.confirmation,
            warehouse_id = EXCLUDED.warehouse_id,
            store_id = EXCLUDED.store_id,
            weight_value = EXCLUDED.weight_value,
            weight_units = EXCLUDED.weight_units,
            dimensions_units = EXCLUDED.dimensions_units,
            dimensions_length = EXCLUDED.dimensions_length,
            dimensions_width = EXCLUDED.dimensions_width,
            dimensions_height = EXCLUDED.dimensions_height,
            tag_ids = EXCLUDED.tag_ids,
            updated_at = NOW()
        RETURNING id
        ",
    )
    .bind(order.shipstation_order_id)
    .bind(&order.shipstation_order_number)
    .bind(&order.order_key)
    .bind(order.order_status.as_str())
    .bind(&order.marketplace)
    .bind(customer_id)
    .bind(&order.customer_name)
    .bind(order.order_date)
    .bind(order.payment_date)
    .bind(order.ship_by_date)
    .bind(order.shipped_date)
    .bind(order.shipstation_modified_at)
    .bind(order.order_total)
    .bind(order.amount_paid)
    .bind(order.tax_amount)
    .bind(order.shipping_amount)
    .bind(&order.customer_notes)
    .bind(&order.internal_notes)
    .bind(order.gift)
    .bind(&order.gift_message)
    .bind(&order.payment_method)
    .bind(&order.requested_shipping_service)
    .bind(&order.carrier_code)
    .bind(&order.service_code)
    .bind(&order.package_code)
    .bind(&order.confirmation)
    .bind(&order.warehouse_id)
    .bind(order.store_id)
    .bind(order.weight_value)
    .bind(&order.weight_units)
    .bind(&order.dimensions_units)
    .bind(order.dimensions_length)
    .bind(order.dimensions_width)
    .bind(order.dimensions_height)
    .bind(&order.tag_ids)
    .fetch_one(&mut *conn)
    .await?;

    Ok(OrderId::new(id))
}

/// Insert or update a line item by its ShipStation line item key.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn upsert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    product_id: ProductId,
    item: &NewOrderItem,
) -> Result<OrderItemId, RepositoryError> {
    let id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO printline.order_items (
            order_id, product_id, shipstation_line_item_key, quantity, unit_price, print_settings
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (shipstation_line_item_key) DO UPDATE SET
            order_id = EXCLUDED.order_id,
            product_id = EXCLUDED.product_id,
            quantity = EXCLUDED.quantity,
            unit_price = EXCLUDED.unit_price,
            print_settings = EXCLUDED.print_settings,
            updated_at = NOW()
        RETURNING id
        ",
    )
    .bind(order_id)
    .bind(product_id)
    .bind(&item.shipstation_line_item_key)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.print_settings.to_json())
    .fetch_one(&mut *conn)
    .await?;

    Ok(OrderItemId::new(id))
}
