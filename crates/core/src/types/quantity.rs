//! Positive line quantities.
//!
//! A cart line at quantity zero does not exist, so [`Quantity`] cannot hold
//! zero. Requests that would drive a line to zero or below are removals and
//! are routed as such before a `Quantity` is ever built.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors constructing a [`Quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("Quantity must be at least 1 (got {0})")]
    NotPositive(i64),
    #[error("Quantity {0} is too large")]
    TooLarge(i64),
}

/// A quantity of at least one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a quantity from a signed request value.
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::NotPositive` for zero or negative values and
    /// `QuantityError::TooLarge` for values that do not fit in a `u32`.
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value <= 0 {
            return Err(QuantityError::NotPositive(value));
        }
        let value32 = u32::try_from(value).map_err(|_| QuantityError::TooLarge(value))?;
        NonZeroU32::new(value32)
            .map(Self)
            .ok_or(QuantityError::NotPositive(value))
    }

    /// The quantity as an unsigned integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// The quantity as a signed integer, for delta arithmetic.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        i64::from(self.0.get())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.get()
    }
}
