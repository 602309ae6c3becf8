//! Integration tests for cartsync.
//!
//! The tests run the real [`HttpCartGateway`] and [`CartStore`] against a
//! `mockito` server standing in for the remote cart service, so no external
//! service is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartsync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `http_gateway` - Request shape, status mapping and credential handling
//! - `store_sync` - Store and consumers over HTTP, session lifecycle

use cartsync::{EngineConfig, HttpCartGateway, StaticCredential};
use cartsync_core::CredentialProvider;
use serde_json::{Value, json};

/// Token the mock server expects.
pub const TOKEN: &str = "ci-token-7Hq2mZ9x";

/// `Authorization` header value for [`TOKEN`].
#[must_use]
pub fn bearer() -> String {
    format!("Bearer {TOKEN}")
}

/// Engine configuration pointing at a mock server, with VND prices.
///
/// # Panics
///
/// Panics if `server_url` is not a valid base URL.
#[must_use]
pub fn config_for(server_url: &str) -> EngineConfig {
    let mut config = EngineConfig::for_base_url(server_url).expect("mock server URL is valid");
    config.currency = cartsync_core::CurrencyCode::VND;
    config
}

/// Gateway against a mock server, authenticated with [`TOKEN`].
#[must_use]
pub fn gateway_for(server_url: &str) -> HttpCartGateway {
    gateway_with(server_url, StaticCredential::new(TOKEN))
}

/// Gateway against a mock server with the given credentials.
///
/// # Panics
///
/// Panics if the gateway cannot be built.
#[must_use]
pub fn gateway_with(
    server_url: &str,
    credentials: impl CredentialProvider + 'static,
) -> HttpCartGateway {
    HttpCartGateway::new(&config_for(server_url), credentials).expect("gateway builds")
}

/// A cart service response body from `(product, quantity, unit price)` lines.
#[must_use]
pub fn cart_body(lines: &[(&str, u32, u64)], total: u64) -> String {
    let items: Vec<Value> = lines
        .iter()
        .map(|(product, quantity, price)| {
            json!({
                "id": format!("line-{product}"),
                "productId": product,
                "name": format!("Product {product}"),
                "image": null,
                "price": price,
                "quantity": quantity,
            })
        })
        .collect();

    json!({
        "items": items,
        "totalPrice": total,
        "currency": "VND",
        "checkoutUrl": "https://shop.test/checkout/abc",
        "updatedAt": "2026-01-01T00:00:00Z",
    })
    .to_string()
}
