//! CLI error type.

use cartsync::{CartError, ConfigError};
use thiserror::Error;

/// Everything that can make a command fail.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cart operation failed: {0}")]
    Cart(#[from] CartError),

    #[error("not signed in: set CART_API_TOKEN")]
    NotSignedIn,

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}
