//! Authentication and authorization shared by every Dishpatch service.
//!
//! This module provides:
//! - Password hashing (argon2, offloaded from the async runtime)
//! - Claims token issuance and verification against one shared secret
//! - The credential store contract and its sled implementation
//! - The restaurant-operator approval state machine
//! - Role-based authorization
//! - Registration and login orchestration per principal kind
//! - Axum extractors for protected routes

pub mod approval;
pub mod authorize;
mod middleware;
pub mod password;
pub mod principal;
pub mod service;
pub mod store;
pub mod token;

pub use approval::{Approval, ApprovalCommand, ApprovalDecision, ApprovalError, ApprovalState};
pub use authorize::{ADMINISTRATORS, authorize};
pub use middleware::{RequireAdmin, RequireAuth};
pub use password::{Argon2Hasher, HashError, PasswordHasher};
pub use principal::{
    GeoPoint, LoginForm, PasswordChangeForm, PrincipalRecord, Profile, PublicPrincipal,
    RegistrationForm,
};
pub use service::{AuthOutcome, AuthService};
pub use store::{CredentialStore, SledCredentialStore, StoreError, UniqueField};
pub use token::{AuthContext, Claims, IssuedToken, TokenIssuer, TokenVerifier, parse_bearer};

use dishpatch_core::ValidationError;
use thiserror::Error;

/// External messages. Distinct failure causes deliberately share a message.
pub mod messages {
    /// No `Authorization` header, or an empty one.
    pub const MISSING_TOKEN: &str = "missing token";
    /// Header present but not `Bearer <token>`.
    pub const MALFORMED_HEADER: &str = "malformed authorization header";
    /// Bad signature, corrupt structure, or expired token.
    pub const INVALID_TOKEN: &str = "invalid or expired";
    /// Valid token for a principal that has since disappeared.
    pub const PRINCIPAL_GONE: &str = "principal no longer exists";
    /// Unknown identifier or wrong password.
    pub const INVALID_CREDENTIALS: &str = "invalid credentials";
    /// Restaurant operator has not been approved yet.
    pub const PENDING_APPROVAL: &str = "pending approval";
    /// Restaurant operator was turned down.
    pub const APPROVAL_REJECTED: &str = "approval rejected";
    /// Role not in the required set.
    pub const FORBIDDEN: &str = "insufficient role";
}

/// Authentication and authorization errors.
///
/// Each variant maps to exactly one HTTP status. `Internal` carries detail for
/// the logs only; its rendered message never includes it.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or missing input (400).
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Duplicate identifier or business license, or a decided approval (409).
    #[error("{0}")]
    Conflict(String),

    /// Caller could not be authenticated (401).
    #[error("{0}")]
    Authentication(&'static str),

    /// Caller is authenticated but not permitted (403).
    #[error("{0}")]
    Authorization(&'static str),

    /// Target resource does not exist (404).
    #[error("{0}")]
    NotFound(String),

    /// Hashing-engine or store fault unrelated to credential correctness (500).
    #[error("internal server error")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code for the error body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::Authentication(_) => "authentication_failed",
            Self::Authorization(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<HashError> for AuthError {
    fn from(err: HashError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => Self::Conflict(field.conflict_message().to_string()),
            StoreError::NotFound => Self::NotFound("principal not found".to_string()),
            StoreError::Approval(ApprovalError::NotPermitted) => {
                Self::Authorization(messages::FORBIDDEN)
            }
            StoreError::Approval(e) => Self::Conflict(e.to_string()),
            StoreError::Backend(_) | StoreError::Corrupt(_) => Self::Internal(err.to_string()),
        }
    }
}
