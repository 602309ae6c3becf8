//! Bearer credential types.
//!
//! The engine never issues or renews credentials. It asks a
//! [`CredentialProvider`] for the current one before every remote call, and an
//! absent credential is a normal state rather than an error.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

/// Bearer token used to authenticate calls to the remote cart service.
///
/// Wraps a `SecretString` so the token never shows up in `Debug` output or
/// logs.
#[derive(Debug, Clone)]
pub struct BearerCredential(SecretString);

impl BearerCredential {
    /// Create a credential from a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Expose the raw token for an `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<SecretString> for BearerCredential {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

/// Supplies the bearer credential on demand.
pub trait CredentialProvider: Send + Sync {
    /// The credential to use for the next call, or `None` when signed out.
    fn current_credential(&self) -> Option<BearerCredential>;
}

impl<P: CredentialProvider + ?Sized> CredentialProvider for Arc<P> {
    fn current_credential(&self) -> Option<BearerCredential> {
        (**self).current_credential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = BearerCredential::new("super_secret_token");
        let debug_output = format!("{credential:?}");
        assert!(!debug_output.contains("super_secret_token"));
        assert_eq!(credential.expose(), "super_secret_token");
    }
}
