//! Core types for cartsync.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod credential;
pub mod id;
pub mod price;
pub mod quantity;

pub use cart::{CartLine, CartSnapshot};
pub use credential::{BearerCredential, CredentialProvider};
pub use id::*;
pub use price::{CurrencyCode, Money, MoneyError};
pub use quantity::{Quantity, QuantityError};
