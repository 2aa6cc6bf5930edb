//! Database operations for products.
//!
//! Products are matched by trimmed SKU first and ShipStation product ID
//! second. Conflicts between the two keys keep the existing row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Connection, PgConnection, PgPool};

use printline_core::ProductId;

use super::{RepositoryError, map_unique_violation};
use crate::models::{NewProduct, Product};

pub(crate) const PRODUCT_COLUMNS: &str = r"
    id, sku, shipstation_product_id, name, image_url, weight_value, weight_units,
    warehouse_location, fulfillment_sku, upc, created_at, updated_at
";

/// Internal row type for product queries.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: i32,
    sku: Option<String>,
    shipstation_product_id: Option<i64>,
    name: String,
    image_url: Option<String>,
    weight_value: Option<Decimal>,
    weight_units: Option<String>,
    warehouse_location: Option<String>,
    fulfillment_sku: Option<String>,
    upc: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            sku: row.sku,
            shipstation_product_id: row.shipstation_product_id,
            name: row.name,
            image_url: row.image_url,
            weight_value: row.weight_value,
            weight_units: row.weight_units,
            warehouse_location: row.warehouse_location,
            fulfillment_sku: row.fulfillment_sku,
            upc: row.upc,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for product reads.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by SKU.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find_by_sku(&mut conn, sku).await
    }
}

/// Get a product by SKU on an existing connection.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn find_by_sku(
    conn: &mut PgConnection,
    sku: &str,
) -> Result<Option<Product>, RepositoryError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM printline.products WHERE sku = $1"
    ))
    .bind(sku)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(Into::into))
}

/// Resolve the product for a line item, creating or updating it.
///
/// Returns `None` when the item has neither a SKU nor a ShipStation
/// product ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` for database errors other than the
/// handled product ID conflict on the SKU path.
#[tracing::instrument(skip(conn, input), fields(sku = ?input.sku, product_id = ?input.shipstation_product_id))]
pub async fn upsert(
    conn: &mut PgConnection,
    input: &NewProduct,
) -> Result<Option<Product>, RepositoryError> {
    let sku = input
        .sku
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if sku.is_none() && input.shipstation_product_id.is_none() {
        tracing::warn!(name = %input.name, "Product skipped: no SKU and no ShipStation product ID");
        return Ok(None);
    }

    if let Some(sku) = sku
        && let Some(existing) = find_by_sku(conn, sku).await?
    {
        return update_existing_by_sku(conn, existing, input).await.map(Some);
    }

    if let Some(product_id) = input.shipstation_product_id {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO printline.products (
                sku, shipstation_product_id, name, image_url, weight_value, weight_units,
                warehouse_location, fulfillment_sku, upc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (shipstation_product_id) DO UPDATE SET
                sku = EXCLUDED.sku,
                name = EXCLUDED.name,
                image_url = EXCLUDED.image_url,
                weight_value = EXCLUDED.weight_value,
                weight_units = EXCLUDED.weight_units,
                warehouse_location = EXCLUDED.warehouse_location,
                fulfillment_sku = EXCLUDED.fulfillment_sku,
                upc = EXCLUDED.upc,
                updated_at = NOW()
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(sku)
        .bind(product_id)
        .bind(&input.name)
        .bind(&input.image_url)
        .bind(input.weight_value)
        .bind(&input.weight_units)
        .bind(&input.warehouse_location)
        .bind(&input.fulfillment_sku)
        .bind(&input.upc)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_unique_violation(e, "product SKU already in use"))?;

        tracing::debug!(product_id = row.id, "Upserted product by ShipStation product ID");
        return Ok(Some(row.into()));
    }

    tracing::warn!(sku = ?sku, "Creating product by SKU only (ShipStation product ID missing)");
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        r"
        INSERT INTO printline.products (
            sku, name, image_url, weight_value, weight_units,
            warehouse_location, fulfillment_sku, upc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {PRODUCT_COLUMNS}
        "
    ))
    .bind(sku)
    .bind(&input.name)
    .bind(&input.image_url)
    .bind(input.weight_value)
    .bind(&input.weight_units)
    .bind(&input.warehouse_location)
    .bind(&input.fulfillment_sku)
    .bind(&input.upc)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_unique_violation(e, "product SKU already in use"))?;

    Ok(Some(row.into()))
}

/// Refresh a product found by SKU, adopting the incoming ShipStation product
/// ID if that ID is not already owned by another product.
async fn update_existing_by_sku(
    conn: &mut PgConnection,
    existing: Product,
    input: &NewProduct,
) -> Result<Product, RepositoryError> {
    if let (Some(incoming), Some(stored)) =
        (input.shipstation_product_id, existing.shipstation_product_id)
        && incoming != stored
    {
        tracing::warn!(
            product_id = %existing.id,
            stored_shipstation_id = stored,
            incoming_shipstation_id = incoming,
            "SKU exists with a different ShipStation product ID, attempting to adopt incoming ID"
        );
    }

    // savepoint: a unique violation must not abort the surrounding transaction
    let mut savepoint = conn.begin().await?;
    let updated = sqlx::query_as::<_, ProductRow>(&format!(
        r"
        UPDATE printline.products SET
            shipstation_product_id = COALESCE($2, shipstation_product_id),
            name = $3,
            image_url = $4,
            weight_value = $5,
            weight_units = $6,
            warehouse_location = $7,
            fulfillment_sku = $8,
            upc = $9,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {PRODUCT_COLUMNS}
        "
    ))
    .bind(existing.id)
    .bind(input.shipstation_product_id)
    .bind(&input.name)
    .bind(&input.image_url)
    .bind(input.weight_value)
    .bind(&input.weight_units)
    .bind(&input.warehouse_location)
    .bind(&input.fulfillment_sku)
    .bind(&input.upc)
    .fetch_one(&mut *savepoint)
    .await
    .map_err(|e| map_unique_violation(e, "ShipStation product ID already in use"));

    match updated {
        Ok(row) => {
            savepoint.commit().await?;
            Ok(row.into())
        }
        Err(RepositoryError::Conflict(reason)) => {
            savepoint.rollback().await?;
            tracing::warn!(
                product_id = %existing.id,
                %reason,
                "Keeping existing product record without updating ShipStation product ID"
            );
            Ok(existing)
        }
        Err(e) => Err(e),
    }
}
