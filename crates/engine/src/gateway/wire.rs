//! Wire format of the remote cart service.
//!
//! Responses are parsed into private DTOs first, then validated into the core
//! snapshot types. Anything that would break a snapshot invariant (zero
//! quantity, negative amount, unknown currency) is a server error.

use std::str::FromStr;

use cartsync_core::{
    CartLine, CartSnapshot, CurrencyCode, LineId, Money, MoneyError, ProductId, Quantity,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::CartError;

/// Body of `POST /cart/items`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AddLineBody<'a> {
    pub product_id: &'a str,
    pub quantity: u32,
}

/// Body of `PATCH /cart/items/{productId}`.
#[derive(Debug, Serialize)]
pub(super) struct SetQuantityBody {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCart {
    #[serde(default)]
    items: Vec<WireLine>,
    total_price: WireAmount,
    currency: Option<String>,
    checkout_url: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLine {
    id: String,
    product_id: String,
    #[serde(default)]
    name: String,
    image: Option<String>,
    price: WireAmount,
    quantity: i64,
}

/// Amounts arrive either as JSON numbers or as decimal strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireAmount {
    Number(serde_json::Number),
    Text(String),
}

impl WireAmount {
    fn into_money(self, currency: CurrencyCode) -> Result<Money, MoneyError> {
        match self {
            Self::Number(n) => Money::parse(&n.to_string(), currency),
            Self::Text(s) => Money::parse(&s, currency),
        }
    }
}

/// Parse a snapshot response body.
pub(super) fn parse_snapshot(
    body: &str,
    default_currency: CurrencyCode,
) -> Result<CartSnapshot, CartError> {
    let cart: WireCart = serde_json::from_str(body).map_err(|e| {
        error!(
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "Failed to parse cart service response"
        );
        CartError::ServerError(format!("Malformed cart payload: {e}"))
    })?;

    cart.into_snapshot(default_currency)
}

impl WireCart {
    fn into_snapshot(self, default_currency: CurrencyCode) -> Result<CartSnapshot, CartError> {
        let currency = match self.currency.as_deref() {
            Some(code) => CurrencyCode::from_str(code).map_err(invalid_payload)?,
            None => default_currency,
        };

        let lines = self
            .items
            .into_iter()
            .map(|line| line.into_line(currency))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CartSnapshot {
            lines,
            grand_total: self.total_price.into_money(currency).map_err(invalid_payload)?,
            checkout_url: self.checkout_url,
            updated_at: self.updated_at,
        })
    }
}

impl WireLine {
    fn into_line(self, currency: CurrencyCode) -> Result<CartLine, CartError> {
        let quantity = Quantity::new(self.quantity).map_err(|e| {
            invalid_payload(format!("line {}: {e}", self.id))
        })?;
        let unit_price = self
            .price
            .into_money(currency)
            .map_err(|e| invalid_payload(format!("line {}: {e}", self.id)))?;

        let line = CartLine {
            line_id: LineId::new(self.id),
            product_id: ProductId::new(self.product_id),
            display_name: self.name,
            image_ref: self.image,
            unit_price,
            quantity,
        };
        // The line total must be representable.
        line.line_total()
            .map_err(|e| invalid_payload(format!("line {}: {e}", line.line_id)))?;
        Ok(line)
    }
}

fn invalid_payload(reason: impl std::fmt::Display) -> CartError {
    error!(reason = %reason, "Cart service returned an invalid snapshot");
    CartError::ServerError(format!("Invalid cart payload: {reason}"))
}
