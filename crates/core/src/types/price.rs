//! Type-safe money representation using decimal arithmetic.
//!
//! Amounts are authoritative values returned by the remote cart service. The
//! engine formats them for display and multiplies unit prices for line totals,
//! but never derives a cart's grand total from its lines.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::quantity::Quantity;

/// Errors constructing a [`Money`] value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Amount must not be negative: {0}")]
    Negative(Decimal),
    #[error("Invalid amount: {0}")]
    Invalid(String),
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),
    #[error("Amount overflows: {0} x {1}")]
    Overflow(Decimal, u32),
}

/// A non-negative monetary amount with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Money {
    /// Create a new amount, rejecting negative values.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` if `amount` is below zero.
    pub fn new(amount: Decimal, currency_code: CurrencyCode) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative(amount));
        }
        Ok(Self {
            amount,
            currency_code,
        })
    }

    /// Parse a decimal string such as `"19.99"` or `"50000"`.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Invalid` if the text is not a decimal number and
    /// `MoneyError::Negative` if it parses to a negative amount.
    pub fn parse(text: &str, currency_code: CurrencyCode) -> Result<Self, MoneyError> {
        let amount = Decimal::from_str(text.trim())
            .map_err(|e| MoneyError::Invalid(format!("{text}: {e}")))?;
        Self::new(amount, currency_code)
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency_code,
        }
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Multiply a unit price by a quantity.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the product does not fit a `Decimal`.
    pub fn times(&self, quantity: Quantity) -> Result<Self, MoneyError> {
        let amount = self
            .amount
            .checked_mul(Decimal::from(quantity.get()))
            .ok_or(MoneyError::Overflow(self.amount, quantity.get()))?;
        Ok(Self {
            amount,
            currency_code: self.currency_code,
        })
    }

    /// Format for display (e.g., "$19.99", "50000 ₫").
    #[must_use]
    pub fn display(&self) -> String {
        let places = self.currency_code.minor_units();
        let rounded = self.amount.round_dp(places);
        let places = places as usize;
        match self.currency_code {
            CurrencyCode::VND => format!("{rounded:.places$} ₫"),
            code => format!("{}{rounded:.places$}", code.symbol()),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    VND,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::VND => "₫",
        }
    }

    /// ISO 4217 code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
            Self::VND => "VND",
        }
    }

    /// Number of decimal places shown for this currency.
    #[must_use]
    pub const fn minor_units(self) -> u32 {
        match self {
            Self::VND => 0,
            _ => 2,
        }
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            "VND" => Ok(Self::VND),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}
