//! Session lifecycle.
//!
//! A [`CartSession`] owns one [`CartStore`] and the credential slot its
//! gateway reads from. Login stores a credential and rehydrates the cart;
//! logout forgets the credential and resets the cart to empty.

use std::sync::Arc;

use cartsync_core::{BearerCredential, CurrencyCode};
use tracing::{info, instrument};

use crate::config::{ConfigError, EngineConfig};
use crate::credentials::SharedCredential;
use crate::error::Result;
use crate::gateway::{CartGateway, HttpCartGateway};
use crate::store::{CartStore, MutationOutcome};

/// One shopper session: the store plus the credential it runs under.
#[derive(Debug, Clone)]
pub struct CartSession {
    store: CartStore,
    credentials: SharedCredential,
}

impl CartSession {
    /// Build a session talking to the configured cart service.
    ///
    /// The configured `CART_API_TOKEN`, if any, is used as the initial
    /// credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway cannot be built from `config`.
    pub fn begin(config: &EngineConfig) -> std::result::Result<Self, ConfigError> {
        let credentials = SharedCredential::new();
        if let Some(token) = &config.api_token {
            credentials.set(BearerCredential::from(token.clone()));
        }
        let gateway = HttpCartGateway::new(config, credentials.clone())?;
        Ok(Self::with_gateway(gateway, config.currency, credentials))
    }

    /// Build a session around any gateway sharing `credentials`.
    #[must_use]
    pub fn with_gateway(
        gateway: impl CartGateway + 'static,
        currency: CurrencyCode,
        credentials: SharedCredential,
    ) -> Self {
        Self {
            store: CartStore::new(gateway, currency),
            credentials,
        }
    }

    /// The session's store.
    #[must_use]
    pub const fn store(&self) -> &CartStore {
        &self.store
    }

    /// Whether a credential is currently held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_present()
    }

    /// Rehydrate the cart if a credential is already held.
    ///
    /// Returns `Ok(None)` without contacting the service when there is none.
    ///
    /// # Errors
    ///
    /// Any failure of the initial fetch.
    pub async fn resume(&self) -> Result<Option<MutationOutcome>> {
        if !self.is_authenticated() {
            info!("No credential yet, cart stays empty");
            return Ok(None);
        }
        self.store.rehydrate().await.map(Some)
    }

    /// Accept a credential from the authentication collaborator and load the
    /// shopper's cart.
    ///
    /// # Errors
    ///
    /// Any failure of the initial fetch.
    #[instrument(skip_all)]
    pub async fn login(&self, credential: BearerCredential) -> Result<MutationOutcome> {
        self.credentials.set(credential);
        info!("Credential received");
        self.store.rehydrate().await
    }

    /// Forget the credential and drop the cart.
    #[instrument(skip_all)]
    pub fn logout(&self) -> Arc<cartsync_core::CartSnapshot> {
        self.credentials.clear();
        info!("Logged out");
        self.store.reset()
    }
}
