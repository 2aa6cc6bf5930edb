//! HTTP client for the ShipStation v1 API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use super::types::{ListOrdersParams, Order, OrdersPage, Tag};
use super::{OrderApi, ShipStationError};
use crate::config::ShipStationConfig;

/// Total attempts per request, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// ShipStation API client.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct ShipStationClient {
    inner: Arc<ShipStationClientInner>,
}

struct ShipStationClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl ShipStationClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ShipStationError::InvalidConfig` if the credentials cannot be
    /// encoded as a header or the HTTP client cannot be built.
    pub fn new(config: &ShipStationConfig) -> Result<Self, ShipStationError> {
        let credentials = format!(
            "{}:{}",
            config.api_key.expose_secret(),
            config.api_secret.expose_secret()
        );
        let mut auth = HeaderValue::from_str(&format!("Basic {}", BASE64.encode(credentials)))
            .map_err(|e| ShipStationError::InvalidConfig(format!("authorization header: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ShipStationError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            inner: Arc::new(ShipStationClientInner {
                client,
                base_url: config.base_url.clone(),
            }),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ShipStationError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ShipStationError::InvalidConfig(format!("bad URL path {path}: {e}")))
    }

    /// Send a request, retrying 429 and 5xx responses up to [`MAX_ATTEMPTS`].
    async fn send_with_retry<T, F>(&self, what: &str, build: F) -> Result<T, ShipStationError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match send_once(build(&self.inner.client)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = retry_delay(&e, attempt);
                    tracing::warn!(
                        request = what,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "ShipStation request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(request = what, attempt, error = %e, "ShipStation request failed");
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl OrderApi for ShipStationClient {
    #[instrument(skip(self), fields(page = params.page))]
    async fn list_orders(&self, params: &ListOrdersParams) -> Result<OrdersPage, ShipStationError> {
        let mut url = self.url("/orders")?;
        params.apply_to(&mut url);

        let page: OrdersPage = self
            .send_with_retry("list_orders", |c| c.get(url.clone()))
            .await?;
        tracing::info!(
            fetched = page.orders.len(),
            page = page.page,
            pages = page.pages,
            total = page.total,
            "Fetched orders page"
        );
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_id: i64) -> Result<OrdersPage, ShipStationError> {
        let url = self.url(&format!("/orders/{order_id}"))?;
        let order: Option<Order> = self
            .send_with_retry("get_order", |c| c.get(url.clone()))
            .await?;
        order
            .map(OrdersPage::single)
            .ok_or_else(|| ShipStationError::NotFound(format!("order {order_id}")))
    }

    #[instrument(skip(self))]
    async fn list_tags(&self) -> Result<Vec<Tag>, ShipStationError> {
        let url = self.url("/accounts/listtags")?;
        let tags: Vec<Tag> = self
            .send_with_retry("list_tags", |c| c.get(url.clone()))
            .await?;
        tracing::info!(count = tags.len(), "Fetched tags");
        Ok(tags)
    }

    #[instrument(skip(self, order), fields(order_id = order.order_id))]
    async fn update_order(&self, order: &Order) -> Result<(), ShipStationError> {
        let url = self.url("/orders/createorder")?;
        let _: serde_json::Value = self
            .send_with_retry("update_order", |c| c.post(url.clone()).json(order))
            .await?;
        Ok(())
    }
}

async fn send_once<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, ShipStationError> {
    let response = request.send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ShipStationError::RateLimited(rate_limit_reset(response.headers())));
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ShipStationError::NotFound(response.url().path().to_owned()));
    }

    let body = response.text().await?;
    if !status.is_success() {
        return Err(ShipStationError::Api {
            status: status.as_u16(),
            body,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

/// Seconds until the rate limit window resets, `0` if not advertised.
fn rate_limit_reset(headers: &HeaderMap) -> u64 {
    ["X-Rate-Limit-Reset", "Retry-After"]
        .iter()
        .find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
        })
        .unwrap_or(0)
}

/// Exponential backoff: `2^attempt` seconds, never below one second.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 2_u64.saturating_pow(attempt).max(1);
    Duration::from_secs(secs)
}

/// Delay before the next attempt after `error`.
fn retry_delay(error: &ShipStationError, attempt: u32) -> Duration {
    match error {
        ShipStationError::RateLimited(secs) if *secs > 0 => Duration::from_secs(*secs),
        _ => backoff_delay(attempt),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_backoff_doubles_with_floor() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_rate_limit_uses_advertised_reset() {
        assert_eq!(
            retry_delay(&ShipStationError::RateLimited(17), 1),
            Duration::from_secs(17)
        );
        assert_eq!(
            retry_delay(&ShipStationError::RateLimited(0), 2),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_reset_header_lookup() {
        let mut headers = HeaderMap::new();
        assert_eq!(rate_limit_reset(&headers), 0);
        headers.insert("Retry-After", HeaderValue::from_static("9"));
        assert_eq!(rate_limit_reset(&headers), 9);
        headers.insert("X-Rate-Limit-Reset", HeaderValue::from_static("30"));
        assert_eq!(rate_limit_reset(&headers), 30);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ShipStationError::RateLimited(1).is_retryable());
        assert!(
            ShipStationError::Api {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ShipStationError::Api {
                status: 400,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!ShipStationError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_client_builds_from_config() {
        let config = ShipStationConfig {
            base_url: Url::parse("https://ssapi.shipstation.com").expect("url"),
            api_key: SecretString::from("key-abc123"),
            api_secret: SecretString::from("secret-def456"),
        };
        assert!(ShipStationClient::new(&config).is_ok());
    }
}
