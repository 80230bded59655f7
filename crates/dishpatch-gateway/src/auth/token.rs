//! Claims tokens.
//!
//! A token is an HS256 JWT over `{id, role, iat, exp}`, signed with the shared
//! secret. Any service holding the same secret can verify a token minted by
//! any other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dishpatch_core::{AuthSettings, PrincipalId, PrincipalKind, Role, SharedSecret};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::AuthError;
use super::messages::{INVALID_TOKEN, MALFORMED_HEADER, MISSING_TOKEN, PRINCIPAL_GONE};
use super::store::CredentialStore;

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal identifier.
    pub id: PrincipalId,
    /// Role at issuance. Trusted until expiry.
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

/// An authenticated caller, attached to a request once its token checks out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    /// Principal identifier.
    pub principal_id: PrincipalId,
    /// Role from the token.
    pub role: Role,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The compact JWT.
    pub token: String,
    /// When it stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// Token failures.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Signing failed or the lifetime overflowed.
    #[error("token encoding failed: {0}")]
    Encoding(String),

    /// Signature, structure, claim, or expiry check failed.
    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(_) => Self::Internal(err.to_string()),
            TokenError::Rejected(_) => Self::Authentication(INVALID_TOKEN),
        }
    }
}

/// Mints claims tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    ttls: HashMap<PrincipalKind, Duration>,
}

impl TokenIssuer {
    /// Create an issuer using the lifetimes configured in `settings`.
    #[must_use]
    pub fn new(secret: &SharedSecret, settings: &AuthSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.expose()),
            ttls: PrincipalKind::ALL
                .into_iter()
                .map(|kind| (kind, settings.token_ttl(kind)))
                .collect(),
        }
    }

    /// Create an issuer with one lifetime for every kind.
    #[must_use]
    pub fn with_ttl(secret: &SharedSecret, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.expose()),
            ttls: PrincipalKind::ALL.into_iter().map(|kind| (kind, ttl)).collect(),
        }
    }

    /// Lifetime of tokens for principals in `kind`.
    #[must_use]
    pub fn ttl(&self, kind: PrincipalKind) -> Duration {
        self.ttls.get(&kind).copied().unwrap_or_default()
    }

    /// Issue a token valid from now.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Encoding` if signing fails.
    pub fn issue(&self, id: PrincipalId, role: Role) -> Result<IssuedToken, TokenError> {
        self.issue_at(id, role, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Encoding` if signing fails or the lifetime overflows.
    pub fn issue_at(
        &self,
        id: PrincipalId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = TimeDelta::from_std(self.ttl(role.kind()))
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Encoding("token lifetime overflows".to_string()))?;

        let claims = Claims {
            id,
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

/// Extract the token from an `Authorization` header value.
///
/// Accepts exactly `Bearer <token>`: one space, a non-empty token, and no
/// further whitespace.
///
/// # Errors
///
/// Returns `AuthError::Authentication` for an absent, empty, or malformed header.
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header
        .filter(|h| !h.is_empty())
        .ok_or(AuthError::Authentication(MISSING_TOKEN))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::Authentication(MALFORMED_HEADER))?;

    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(AuthError::Authentication(MALFORMED_HEADER));
    }

    Ok(token)
}

/// Verifies claims tokens and resolves them to live principals.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    store: Arc<dyn CredentialStore>,
}

impl TokenVerifier {
    /// Create a verifier.
    #[must_use]
    pub fn new(secret: &SharedSecret, store: Arc<dyn CredentialStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose()),
            validation,
            store,
        }
    }

    /// Check signature, structure, and expiry.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Rejected` if any check fails.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        Ok(decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims)
    }

    /// Authenticate an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Authentication` if the header is missing or
    /// malformed, the token does not verify, or its principal is gone.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<AuthContext, AuthError> {
        let token = parse_bearer(header)?;

        let claims = self.decode(token).map_err(|e| {
            debug!(error = %e, "Token rejected");
            AuthError::Authentication(INVALID_TOKEN)
        })?;

        match self.store.find_by_id(claims.role.kind(), claims.id).await {
            Ok(Some(_)) => Ok(AuthContext {
                principal_id: claims.id,
                role: claims.role,
            }),
            Ok(None) => {
                debug!(principal = %claims.id, "Token for deleted principal");
                Err(AuthError::Authentication(PRINCIPAL_GONE))
            }
            Err(e) => {
                warn!(error = %e, "Principal lookup failed during token verification");
                Err(AuthError::Authentication(INVALID_TOKEN))
            }
        }
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal::{PrincipalRecord, Profile};
    use crate::auth::store::SledCredentialStore;
    use jsonwebtoken::errors::ErrorKind;

    const SECRET: &str = "a-shared-secret-of-reasonable-length";

    fn store() -> (tempfile::TempDir, Arc<SledCredentialStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledCredentialStore::open(dir.path()).unwrap();
        (dir, Arc::new(store))
    }

    fn customer() -> PrincipalRecord {
        PrincipalRecord::new(
            "a@x.com".to_string(),
            "$argon2id$unused".to_string(),
            Role::Customer,
            Some("Ada".to_string()),
            None,
            Profile::Customer { address: None },
            Utc::now(),
        )
    }

    fn verifier(store: Arc<SledCredentialStore>) -> TokenVerifier {
        TokenVerifier::new(&SharedSecret::from(SECRET), store)
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::with_ttl(&SharedSecret::from(SECRET), Duration::from_secs(3600))
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");

        for (header, message) in [
            (None, MISSING_TOKEN),
            (Some(""), MISSING_TOKEN),
            (Some("Bearer"), MALFORMED_HEADER),
            (Some("Bearer "), MALFORMED_HEADER),
            (Some("Bearer  abc"), MALFORMED_HEADER),
            (Some("bearer abc"), MALFORMED_HEADER),
            (Some("abc"), MALFORMED_HEADER),
            (Some("Basic abc"), MALFORMED_HEADER),
            (Some("Bearer abc def"), MALFORMED_HEADER),
        ] {
            let err = parse_bearer(header).unwrap_err();
            assert!(
                matches!(err, AuthError::Authentication(m) if m == message),
                "header {header:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_issue_and_decode() {
        let (_dir, store) = store();
        let id = PrincipalId::new();
        let issued = issuer().issue(id, Role::Customer).unwrap();

        let claims = verifier(store).decode(&issued.token).unwrap();
        assert_eq!(claims.id, id);
        assert_eq!(claims.role, Role::Customer);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_per_kind_lifetimes() {
        let settings = AuthSettings::builder()
            .token_ttl(Duration::from_secs(600))
            .token_ttl_for(PrincipalKind::Admin, Duration::from_secs(60))
            .build();
        let issuer = TokenIssuer::new(&SharedSecret::from(SECRET), &settings);

        assert_eq!(issuer.ttl(PrincipalKind::Customer), Duration::from_secs(600));
        assert_eq!(issuer.ttl(PrincipalKind::Admin), Duration::from_secs(60));

        let now = Utc::now();
        let issued = issuer.issue_at(PrincipalId::new(), Role::SuperAdmin, now).unwrap();
        assert_eq!(issued.expires_at.timestamp(), now.timestamp() + 60);
    }

    #[test]
    fn test_expired_token_rejected_without_leeway() {
        let (_dir, store) = store();
        let issuer = TokenIssuer::with_ttl(&SharedSecret::from(SECRET), Duration::from_secs(60));
        let issued_at = Utc::now() - TimeDelta::seconds(65);
        let issued = issuer.issue_at(PrincipalId::new(), Role::Customer, issued_at).unwrap();

        let err = verifier(store).decode(&issued.token).unwrap_err();
        assert!(matches!(
            err,
            TokenError::Rejected(ref e) if matches!(e.kind(), ErrorKind::ExpiredSignature)
        ));
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let (_dir, store) = store();
        let other =
            TokenIssuer::with_ttl(&SharedSecret::from("another-secret"), Duration::from_secs(60));
        let issued = other.issue(PrincipalId::new(), Role::Admin).unwrap();

        assert!(verifier(store).decode(&issued.token).is_err());
    }

    #[test]
    fn test_tampered_and_garbage_tokens_rejected() {
        let (_dir, store) = store();
        let verifier = verifier(store);
        let id = PrincipalId::new();
        let customer = issuer().issue(id, Role::Customer).unwrap();
        let admin = issuer().issue(id, Role::Admin).unwrap();

        // Admin payload under the customer token's signature.
        let customer_parts: Vec<&str> = customer.token.split('.').collect();
        let admin_parts: Vec<&str> = admin.token.split('.').collect();
        let tampered = format!("{}.{}.{}", customer_parts[0], admin_parts[1], customer_parts[2]);

        assert!(verifier.decode(&customer.token).is_ok());
        assert!(verifier.decode(&tampered).is_err());
        assert!(verifier.decode("not.a.token").is_err());
        assert!(verifier.decode("").is_err());
    }

    #[test]
    fn test_near_miss_role_rejected() {
        let (_dir, store) = store();
        let now = Utc::now().timestamp();
        let forged = encode(
            &Header::default(),
            &serde_json::json!({
                "id": PrincipalId::new(),
                "role": "Admin",
                "iat": now,
                "exp": now + 600,
            }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(verifier(store).decode(&forged).is_err());
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let (_dir, store) = store();
        let now = Utc::now().timestamp();
        let token = encode(
            &Header::new(Algorithm::HS512),
            &Claims {
                id: PrincipalId::new(),
                role: Role::Admin,
                iat: now,
                exp: now + 600,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(verifier(store).decode(&token).is_err());
    }

    #[tokio::test]
    async fn test_authenticate_resolves_principal() {
        let (_dir, store) = store();
        let record = customer();
        store.create(&record).await.unwrap();

        let issued = issuer().issue(record.id, record.role).unwrap();
        let header = format!("Bearer {}", issued.token);
        let context = verifier(store).authenticate(Some(&header)).await.unwrap();

        assert_eq!(
            context,
            AuthContext {
                principal_id: record.id,
                role: Role::Customer,
            }
        );
    }

    #[tokio::test]
    async fn test_authenticate_missing_principal() {
        let (_dir, store) = store();
        let issued = issuer().issue(PrincipalId::new(), Role::Customer).unwrap();
        let header = format!("Bearer {}", issued.token);

        let err = verifier(store).authenticate(Some(&header)).await.unwrap_err();
        assert!(matches!(err, AuthError::Authentication(PRINCIPAL_GONE)));
    }

    #[tokio::test]
    async fn test_authenticate_looks_in_role_collection() {
        let (_dir, store) = store();
        let record = customer();
        store.create(&record).await.unwrap();

        // Same id, but the role points at another collection.
        let issued = issuer().issue(record.id, Role::DeliveryPersonnel).unwrap();
        let header = format!("Bearer {}", issued.token);

        let err = verifier(store).authenticate(Some(&header)).await.unwrap_err();
        assert!(matches!(err, AuthError::Authentication(PRINCIPAL_GONE)));
    }

    #[tokio::test]
    async fn test_authenticate_bad_token() {
        let (_dir, store) = store();
        let err = verifier(store)
            .authenticate(Some("Bearer not.a.token"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication(INVALID_TOKEN)));
    }
}
