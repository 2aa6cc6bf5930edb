//! Database operations for customers.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use printline_core::CustomerId;

use super::{RepositoryError, map_unique_violation};
use crate::models::{Customer, CustomerAddress, NewCustomer};

const CUSTOMER_COLUMNS: &str = r"
    id, email, name, shipstation_customer_id, company, street1, street2, street3,
    city, state, postal_code, country_code, phone, is_residential,
    address_verified_status, created_at, updated_at
";

/// Internal row type for customer queries.
#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: i32,
    email: String,
    name: String,
    shipstation_customer_id: Option<String>,
    company: Option<String>,
    street1: Option<String>,
    street2: Option<String>,
    street3: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country_code: Option<String>,
    phone: Option<String>,
    is_residential: Option<bool>,
    address_verified_status: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Self {
            id: CustomerId::new(row.id),
            email: row.email,
            name: row.name,
            shipstation_customer_id: row.shipstation_customer_id,
            company: row.company,
            street1: row.street1,
            street2: row.street2,
            street3: row.street3,
            city: row.city,
            state: row.state,
            postal_code: row.postal_code,
            country_code: row.country_code,
            phone: row.phone,
            is_residential: row.is_residential,
            address_verified_status: row.address_verified_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for customer database operations.
pub struct CustomerRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CustomerRepository<'a> {
    /// Create a new customer repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a customer by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM printline.customers WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Insert or update a customer by email.
    ///
    /// The name is always refreshed. Address fields are overwritten only when
    /// the order carried a ship-to address; the ShipStation customer ID only
    /// when one was supplied.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the ShipStation customer ID is
    /// already attached to a different email.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(&self, input: &NewCustomer) -> Result<Customer, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, input).await
    }
}

/// Insert or update a customer on an existing connection.
///
/// # Errors
///
/// See [`CustomerRepository::upsert`].
pub async fn upsert(
    conn: &mut PgConnection,
    input: &NewCustomer,
) -> Result<Customer, RepositoryError> {
    let has_address = input.address.is_some();
    let empty = CustomerAddress::default();
    let address = input.address.as_ref().unwrap_or(&empty);

    let row = sqlx::query_as::<_, CustomerRow>(&format!(
        r"
        INSERT INTO printline.customers (
            email, name, shipstation_customer_id, company, street1, street2, street3,
            city, state, postal_code, country_code, phone, is_residential,
            address_verified_status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (email) DO UPDATE SET
            name = EXCLUDED.name,
            shipstation_customer_id = COALESCE(
                EXCLUDED.shipstation_customer_id, customers.shipstation_customer_id
            ),
            company = CASE WHEN $15 THEN EXCLUDED.company ELSE customers.company END,
            street1 = CASE WHEN $15 THEN EXCLUDED.street1 ELSE customers.street1 END,
            street2 = CASE WHEN $15 THEN EXCLUDED.street2 ELSE customers.street2 END,
            street3 = CASE WHEN $15 THEN EXCLUDED.street3 ELSE customers.street3 END,
            city = CASE WHEN $15 THEN EXCLUDED.city ELSE customers.city END,
            state = CASE WHEN $15 THEN EXCLUDED.state ELSE customers.state END,
            postal_code = CASE WHEN $15 THEN EXCLUDED.postal_code ELSE customers.postal_code END,
            country_code = CASE WHEN $15 THEN EXCLUDED.country_code ELSE customers.country_code END,
            phone = CASE WHEN $15 THEN EXCLUDED.phone ELSE customers.phone END,
            is_residential = CASE WHEN $15 THEN EXCLUDED.is_residential
                ELSE customers.is_residential END,
            address_verified_status = CASE WHEN $15 THEN EXCLUDED.address_verified_status
                ELSE customers.address_verified_status END,
            updated_at = NOW()
        RETURNING {CUSTOMER_COLUMNS}
        "
    ))
    .bind(&input.email)
    .bind(&input.name)
    .bind(&input.shipstation_customer_id)
    .bind(&address.company)
    .bind(&address.street1)
    .bind(&address.street2)
    .bind(&address.street3)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.postal_code)
    .bind(&address.country_code)
    .bind(&address.phone)
    .bind(address.is_residential)
    .bind(&address.address_verified_status)
    .bind(has_address)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_unique_violation(e, "customer already exists"))?;

    Ok(row.into())
}
