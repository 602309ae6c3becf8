//! Remote cart service gateway.
//!
//! # Architecture
//!
//! - [`CartGateway`] is the seam the store talks to; it owns no state
//! - [`HttpCartGateway`] implements it with `reqwest` against a REST service
//! - The remote service is the source of truth - no local arithmetic, no retries
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |---|---|
//! | fetch | `GET {base}/cart` |
//! | add | `POST {base}/cart/items` |
//! | set quantity | `PATCH {base}/cart/items/{productId}` |
//! | remove | `DELETE {base}/cart/items/{productId}` |
//! | clear | `DELETE {base}/cart` |

mod wire;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cartsync_core::{CartSnapshot, CredentialProvider, CurrencyCode, ProductId, Quantity};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tracing::{Span, debug, error, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{ConfigError, EngineConfig};
use crate::error::{CartError, Result};

use wire::{AddLineBody, SetQuantityBody, parse_snapshot};

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest slice of a response body copied into errors and logs.
const BODY_EXCERPT_CHARS: usize = 200;

/// Operations against the remote cart service.
///
/// Implementations translate each call into a remote request and parse the
/// answer into a [`CartSnapshot`]. They never retry and never compute
/// quantities; both belong to the caller.
#[async_trait]
pub trait CartGateway: Send + Sync {
    /// Fetch the current cart.
    async fn fetch_snapshot(&self) -> Result<CartSnapshot>;

    /// Add `quantity` units of a product.
    async fn add_line(&self, product_id: &ProductId, quantity: Quantity) -> Result<CartSnapshot>;

    /// Set the quantity of an existing line.
    async fn set_quantity(&self, product_id: &ProductId, quantity: Quantity)
    -> Result<CartSnapshot>;

    /// Remove a product's line.
    async fn remove_line(&self, product_id: &ProductId) -> Result<CartSnapshot>;

    /// Empty the cart. The caller substitutes the canonical empty snapshot.
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
impl<G: CartGateway + ?Sized> CartGateway for Arc<G> {
    async fn fetch_snapshot(&self) -> Result<CartSnapshot> {
        (**self).fetch_snapshot().await
    }

    async fn add_line(&self, product_id: &ProductId, quantity: Quantity) -> Result<CartSnapshot> {
        (**self).add_line(product_id, quantity).await
    }

    async fn set_quantity(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> Result<CartSnapshot> {
        (**self).set_quantity(product_id, quantity).await
    }

    async fn remove_line(&self, product_id: &ProductId) -> Result<CartSnapshot> {
        (**self).remove_line(product_id).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
}

// =============================================================================
// HttpCartGateway
// =============================================================================

/// REST client for the remote cart service.
///
/// Cheap to clone. Every call asks the credential provider for a bearer
/// token first; without one it fails with `NotAuthenticated` and sends
/// nothing.
#[derive(Clone)]
pub struct HttpCartGateway {
    inner: Arc<HttpCartGatewayInner>,
}

struct HttpCartGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    currency: CurrencyCode,
    credentials: Box<dyn CredentialProvider>,
}

impl std::fmt::Debug for HttpCartGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCartGateway")
            .field("base_url", &self.inner.base_url.as_str())
            .field("timeout", &self.inner.timeout)
            .field("currency", &self.inner.currency)
            .finish_non_exhaustive()
    }
}

impl HttpCartGateway {
    /// Create a new gateway.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the base URL cannot carry a path.
    pub fn new(
        config: &EngineConfig,
        credentials: impl CredentialProvider + 'static,
    ) -> std::result::Result<Self, ConfigError> {
        if config.base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidEnvVar(
                "CART_API_BASE_URL".to_string(),
                "URL cannot be used as a base".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(HttpCartGatewayInner {
                client: reqwest::Client::new(),
                base_url: config.base_url.clone(),
                timeout: config.timeout,
                currency: config.currency,
                credentials: Box::new(credentials),
            }),
        })
    }

    /// Build an endpoint URL from path segments (segments are percent-encoded).
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.inner.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send one authenticated request and return the raw success body.
    async fn execute<B>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<String>
    where
        B: Serialize + Sync + ?Sized,
    {
        let Some(credential) = self.inner.credentials.current_credential() else {
            debug!("No credential available, skipping remote call");
            return Err(CartError::NotAuthenticated);
        };

        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());

        let mut request = self
            .inner
            .client
            .request(method, self.endpoint(segments))
            .bearer_auth(credential.expose())
            .header(REQUEST_ID_HEADER, &request_id)
            .header(ACCEPT, "application/json")
            .timeout(self.inner.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(1);
            warn!(retry_after_secs, "Cart service rate limited the request");
            return Err(CartError::RateLimited { retry_after_secs });
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status, &response_text));
        }

        Ok(response_text)
    }

    async fn execute_snapshot<B>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<CartSnapshot>
    where
        B: Serialize + Sync + ?Sized,
    {
        let text = self.execute(method, segments, body).await?;
        let snapshot = parse_snapshot(&text, self.inner.currency)?;
        debug!(
            lines = snapshot.lines.len(),
            grand_total = %snapshot.grand_total,
            "Received cart snapshot"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl CartGateway for HttpCartGateway {
    #[instrument(skip(self), fields(request_id = tracing::field::Empty))]
    async fn fetch_snapshot(&self) -> Result<CartSnapshot> {
        self.execute_snapshot::<()>(Method::GET, &["cart"], None)
            .await
    }

    #[instrument(
        skip(self),
        fields(product_id = %product_id, quantity = %quantity, request_id = tracing::field::Empty)
    )]
    async fn add_line(&self, product_id: &ProductId, quantity: Quantity) -> Result<CartSnapshot> {
        let body = AddLineBody {
            product_id: product_id.as_str(),
            quantity: quantity.get(),
        };
        self.execute_snapshot(Method::POST, &["cart", "items"], Some(&body))
            .await
    }

    #[instrument(
        skip(self),
        fields(product_id = %product_id, quantity = %quantity, request_id = tracing::field::Empty)
    )]
    async fn set_quantity(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> Result<CartSnapshot> {
        let body = SetQuantityBody {
            quantity: quantity.get(),
        };
        self.execute_snapshot(
            Method::PATCH,
            &["cart", "items", product_id.as_str()],
            Some(&body),
        )
        .await
    }

    #[instrument(
        skip(self),
        fields(product_id = %product_id, request_id = tracing::field::Empty)
    )]
    async fn remove_line(&self, product_id: &ProductId) -> Result<CartSnapshot> {
        self.execute_snapshot::<()>(
            Method::DELETE,
            &["cart", "items", product_id.as_str()],
            None,
        )
        .await
    }

    #[instrument(skip(self), fields(request_id = tracing::field::Empty))]
    async fn clear(&self) -> Result<()> {
        // Body intentionally ignored; the store commits the canonical empty cart
        self.execute::<()>(Method::DELETE, &["cart"], None).await?;
        Ok(())
    }
}

/// Map a non-success status to the error taxonomy.
fn status_error(status: StatusCode, body: &str) -> CartError {
    let excerpt = body.chars().take(BODY_EXCERPT_CHARS).collect::<String>();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(status = %status, "Cart service rejected the credential");
            CartError::NotAuthenticated
        }
        StatusCode::NOT_FOUND => {
            debug!(status = %status, body = %excerpt, "Cart service reported not found");
            CartError::NotFound(if excerpt.is_empty() {
                "line or product no longer exists".to_string()
            } else {
                excerpt
            })
        }
        _ => {
            error!(
                status = %status,
                body = %excerpt,
                "Cart service returned non-success status"
            );
            CartError::ServerError(format!("HTTP {status}: {excerpt}"))
        }
    }
}
