//! Cart snapshot types.
//!
//! A [`CartSnapshot`] is the complete cart state returned by the remote service
//! after an operation. Snapshots are never edited in place: every committed
//! change produces a new value, which is what lets any number of readers share
//! one behind an `Arc` without locking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{LineId, ProductId};
use super::price::{CurrencyCode, Money, MoneyError};
use super::quantity::Quantity;

/// One product line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Line ID assigned by the remote service (stable across refreshes).
    pub line_id: LineId,
    /// Catalog item this line refers to.
    pub product_id: ProductId,
    /// Display name, opaque to the engine.
    pub display_name: String,
    /// Image reference, opaque to the engine.
    pub image_ref: Option<String>,
    /// Server-authoritative unit price.
    pub unit_price: Money,
    /// Units of the product in the cart.
    pub quantity: Quantity,
}

impl CartLine {
    /// Unit price times quantity, for display next to the line.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the product does not fit a `Decimal`.
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.unit_price.times(self.quantity)
    }
}

/// Full, consistent cart state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// Lines in the order the server returned them.
    pub lines: Vec<CartLine>,
    /// Server-authoritative total. Never recomputed from `lines`.
    pub grand_total: Money,
    /// Checkout URL, when the service provides one.
    pub checkout_url: Option<String>,
    /// Last server-side modification time, when provided.
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartSnapshot {
    /// The canonical empty snapshot: no lines, zero total.
    #[must_use]
    pub const fn empty(currency_code: CurrencyCode) -> Self {
        Self {
            lines: Vec::new(),
            grand_total: Money::zero(currency_code),
            checkout_url: None,
            updated_at: None,
        }
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity.get())).sum()
    }

    /// The line for a product, if present.
    #[must_use]
    pub fn line_for(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.product_id == product_id)
    }

    /// Currency of the grand total.
    #[must_use]
    pub const fn currency_code(&self) -> CurrencyCode {
        self.grand_total.currency_code
    }
}
