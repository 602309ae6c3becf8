//! Cartsync - client-side cart synchronization engine.
//!
//! The remote cart service is the only source of truth. This crate keeps the
//! last committed [`CartSnapshot`](cartsync_core::CartSnapshot) in memory,
//! routes every mutation through the remote service, and broadcasts each new
//! snapshot to any number of independent consumers.
//!
//! # Architecture
//!
//! - [`gateway`] - Stateless translation of cart operations into REST calls
//! - [`store`] - The committed snapshot, revision-tagged mutations, subscriptions
//! - [`consumers`] - Badge, panel and checkout views derived from snapshots
//! - [`session`] - Per-session lifecycle (login rehydrates, logout resets)
//! - [`credentials`] - Credential provider implementations
//!
//! # Example
//!
//! ```rust,ignore
//! use cartsync::{CartStore, HttpCartGateway, SharedCredential};
//!
//! let credentials = SharedCredential::new();
//! let gateway = HttpCartGateway::new(&config, credentials.clone())?;
//! let store = CartStore::new(gateway, config.currency);
//!
//! let badge = cartsync::consumers::BadgeCounter::mount(&store);
//! store.add_to_cart(&"sku-1".into(), 2).await?;
//! assert_eq!(badge.count(), 2);
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod consumers;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod session;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use credentials::{SharedCredential, StaticCredential};
pub use error::{CartError, Result};
pub use gateway::{CartGateway, HttpCartGateway};
pub use session::CartSession;
pub use store::{CartListener, CartStore, MutationOutcome, Revision, Subscription};
