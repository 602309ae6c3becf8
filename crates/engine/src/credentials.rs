//! Credential provider implementations.
//!
//! Issuing and renewing tokens belongs to the authentication collaborator.
//! These types only hold whatever credential it handed over.

use std::sync::Arc;

use cartsync_core::{BearerCredential, CredentialProvider};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};

/// A credential fixed at construction, or permanently absent.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<BearerCredential>);

impl StaticCredential {
    /// Always supply this token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(BearerCredential::new(token)))
    }

    /// Never supply a credential.
    #[must_use]
    pub const fn absent() -> Self {
        Self(None)
    }

    /// From an optional configured secret.
    #[must_use]
    pub fn from_secret(secret: Option<&SecretString>) -> Self {
        Self(secret.map(|s| BearerCredential::new(s.expose_secret())))
    }
}

impl CredentialProvider for StaticCredential {
    fn current_credential(&self) -> Option<BearerCredential> {
        self.0.clone()
    }
}

/// A credential slot shared between the session and the gateway.
///
/// Login sets it, logout clears it. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SharedCredential {
    slot: Arc<RwLock<Option<BearerCredential>>>,
}

impl SharedCredential {
    /// An empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a credential, replacing any previous one.
    pub fn set(&self, credential: BearerCredential) {
        *self.slot.write() = Some(credential);
    }

    /// Forget the credential.
    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    /// Whether a credential is currently held.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.slot.read().is_some()
    }
}

impl CredentialProvider for SharedCredential {
    fn current_credential(&self) -> Option<BearerCredential> {
        self.slot.read().clone()
    }
}
