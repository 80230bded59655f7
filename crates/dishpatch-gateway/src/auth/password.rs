//! Password hashing.
//!
//! Digests are self-describing PHC strings: the salt and the work parameters
//! travel inside the digest, so raising the cost later does not invalidate
//! existing credentials.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        Error as PhcError, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
        rand_core::OsRng,
    },
};
use async_trait::async_trait;
use dishpatch_core::Password;
use thiserror::Error;

/// Hashing engine failures. None of these say anything about whether a
/// credential was correct.
#[derive(Debug, Error)]
pub enum HashError {
    /// The engine rejected its input or parameters.
    #[error("password hashing failed: {0}")]
    Engine(String),

    /// A stored digest could not be parsed.
    #[error("stored credential digest is malformed")]
    MalformedDigest,

    /// The blocking hashing task panicked or was cancelled.
    #[error("hashing task failed: {0}")]
    Join(String),
}

/// One-way credential hashing.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Produce a salted digest of `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns `HashError` if the engine fails.
    async fn hash(&self, plaintext: &Password) -> Result<String, HashError>;

    /// Check `candidate` against a stored digest.
    ///
    /// An absent or empty candidate is simply `false`.
    ///
    /// # Errors
    ///
    /// Returns `HashError` only for engine faults or an unparseable digest,
    /// never for a wrong password.
    async fn verify(&self, candidate: Option<&Password>, digest: &str) -> Result<bool, HashError>;
}

/// Argon2id hasher. The configured cost is the argon2 time cost.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Create a hasher with the given time cost.
    ///
    /// # Errors
    ///
    /// Returns `HashError::Engine` if argon2 rejects the cost.
    pub fn new(cost: u32) -> Result<Self, HashError> {
        let params = Params::new(Params::DEFAULT_M_COST, cost, Params::DEFAULT_P_COST, None)
            .map_err(|e| HashError::Engine(e.to_string()))?;
        Ok(Self { params })
    }

    /// The configured time cost.
    #[must_use]
    pub fn cost(&self) -> u32 {
        self.params.t_cost()
    }

    fn engine(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash on the current thread.
    ///
    /// # Errors
    ///
    /// Returns `HashError::Engine` if hashing fails.
    pub fn hash_blocking(&self, plaintext: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.engine()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| HashError::Engine(e.to_string()))
    }

    /// Verify on the current thread.
    ///
    /// # Errors
    ///
    /// Returns `HashError::MalformedDigest` if `digest` is not a PHC string.
    pub fn verify_blocking(&self, candidate: &str, digest: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(digest).map_err(|_| HashError::MalformedDigest)?;

        match self.engine().verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(e) => Err(HashError::Engine(e.to_string())),
        }
    }
}

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    async fn hash(&self, plaintext: &Password) -> Result<String, HashError> {
        let hasher = self.clone();
        let plaintext = plaintext.clone();

        tokio::task::spawn_blocking(move || hasher.hash_blocking(plaintext.expose()))
            .await
            .map_err(|e| HashError::Join(e.to_string()))?
    }

    async fn verify(&self, candidate: Option<&Password>, digest: &str) -> Result<bool, HashError> {
        let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
            return Ok(false);
        };

        let hasher = self.clone();
        let candidate = candidate.clone();
        let digest = digest.to_string();

        tokio::task::spawn_blocking(move || hasher.verify_blocking(candidate.expose(), &digest))
            .await
            .map_err(|e| HashError::Join(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Argon2Hasher {
        Argon2Hasher::new(1).unwrap()
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = hasher();
        let digest = hasher.hash(&Password::from("p1")).await.unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(!digest.contains("p1"));
        assert!(hasher.verify(Some(&Password::from("p1")), &digest).await.unwrap());
        assert!(!hasher.verify(Some(&Password::from("p2")), &digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_digests_are_salted() {
        let hasher = hasher();
        let a = hasher.hash(&Password::from("same")).await.unwrap();
        let b = hasher.hash(&Password::from("same")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_empty_candidate_is_false() {
        let hasher = hasher();
        let digest = hasher.hash(&Password::from("p1")).await.unwrap();

        assert!(!hasher.verify(None, &digest).await.unwrap());
        assert!(!hasher.verify(Some(&Password::from("")), &digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_digest_is_an_engine_fault() {
        let result = hasher().verify(Some(&Password::from("p1")), "not-a-digest").await;
        assert!(matches!(result, Err(HashError::MalformedDigest)));
    }

    #[tokio::test]
    async fn test_cost_travels_with_digest() {
        let digest = Argon2Hasher::new(2)
            .unwrap()
            .hash(&Password::from("p1"))
            .await
            .unwrap();
        assert!(digest.contains("t=2"));

        // A hasher configured with another cost still verifies it.
        assert!(hasher().verify(Some(&Password::from("p1")), &digest).await.unwrap());
    }

    #[test]
    fn test_zero_cost_rejected() {
        assert!(Argon2Hasher::new(0).is_err());
        assert_eq!(hasher().cost(), 1);
    }
}
