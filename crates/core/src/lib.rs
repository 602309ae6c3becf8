//! Cartsync Core - Shared cart types.
//!
//! This crate provides the data model used across all cartsync components:
//! - `cartsync` - The cart synchronization engine (gateway, store, consumers)
//! - `cartsync-cli` - Command-line driver for the engine
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients,
//! no async runtime. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, money, quantities, credentials and
//!   the immutable cart snapshot

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
