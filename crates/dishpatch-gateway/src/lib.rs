//! # Dishpatch Gateway
//!
//! The authentication and authorization layer every Dishpatch service runs,
//! and the HTTP surface that exposes it.
//!
//! Services hosting different principal collections (customers, couriers,
//! restaurant operators, administrators) share one signing secret, so a token
//! issued by any of them verifies on all of them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
mod server;

pub use auth::{
    AuthContext, AuthError, AuthOutcome, AuthService, CredentialStore, PasswordHasher,
    SledCredentialStore,
};
pub use server::{Gateway, GatewayBuilder, GatewayState, router};

use dishpatch_core::{Config, ConfigError};

/// Start a gateway and serve until Ctrl-C.
///
/// # Errors
///
/// Returns error if the gateway cannot be built or the server fails.
pub async fn start(config: Config) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Credential store error.
    #[error("Storage error: {0}")]
    Storage(#[from] auth::StoreError),

    /// Password hasher could not be configured.
    #[error("Hasher error: {0}")]
    Hasher(#[from] auth::HashError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
