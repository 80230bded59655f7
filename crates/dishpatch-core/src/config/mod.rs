//! Configuration loading and validation.
//!
//! Config location: `~/.dishpatch/dishpatch.json` (JSON5). Every value can be
//! overridden from the environment; the recognized auth options are
//! `SHARED_SECRET`, `TOKEN_TTL`, `TOKEN_TTL_<KIND>` and `HASH_COST`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::secrets::SharedSecret;
use crate::types::PrincipalKind;

/// Environment variable holding the shared token-signing secret.
pub const ENV_SHARED_SECRET: &str = "SHARED_SECRET";
/// Environment variable holding the default token lifetime.
pub const ENV_TOKEN_TTL: &str = "TOKEN_TTL";
/// Environment variable holding the password hashing cost.
pub const ENV_HASH_COST: &str = "HASH_COST";
/// Environment variable overriding the state directory.
pub const ENV_STATE_DIR: &str = "DISHPATCH_STATE_DIR";

/// Default token lifetime (7 days).
const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 3600;
/// Default password hashing cost.
const DEFAULT_HASH_COST: u32 = 12;
/// Highest accepted hashing cost.
const MAX_HASH_COST: u32 = 64;
/// Secrets shorter than this are accepted with a warning.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Service (HTTP listener and hosted collections) settings.
    #[serde(default)]
    pub service: ServiceSettings,

    /// Token and password settings.
    #[serde(default)]
    pub auth: AuthSettings,
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns error if an existing config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("dishpatch.json")
    }

    /// Get the Dishpatch state directory.
    ///
    /// Uses `DISHPATCH_STATE_DIR` env var if set, otherwise `~/.dishpatch`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".dishpatch")
        } else {
            PathBuf::from(".dishpatch")
        }
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if an override is present but invalid.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if an override is present but invalid.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        self.auth = self.auth.with_overrides(lookup)?;
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service.validate()?;
        self.auth.validate()
    }
}

/// HTTP listener and hosted collections.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSettings {
    /// Service name, used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Credential store location.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Principal collections this service registers and logs in.
    #[serde(default = "default_principal_kinds")]
    pub principal_kinds: Vec<PrincipalKind>,
}

fn default_service_name() -> String {
    "dishpatch".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    4000
}

fn default_data_dir() -> PathBuf {
    Config::state_dir().join("data")
}

fn default_principal_kinds() -> Vec<PrincipalKind> {
    PrincipalKind::ALL.to_vec()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            bind_address: default_bind_address(),
            port: default_port(),
            data_dir: default_data_dir(),
            principal_kinds: default_principal_kinds(),
        }
    }
}

impl ServiceSettings {
    /// Whether this service hosts the given collection.
    #[must_use]
    pub fn hosts(&self, kind: PrincipalKind) -> bool {
        self.principal_kinds.contains(&kind)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "Service port cannot be 0".to_string(),
            ));
        }
        if self.principal_kinds.is_empty() {
            return Err(ConfigError::Validation(
                "Service must host at least one principal kind".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token and password settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    /// Shared signing secret. Must be byte-identical on every service.
    #[serde(default)]
    pub shared_secret: Option<SharedSecret>,

    /// Default token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Token lifetime per principal kind (keyed by kind tag), in seconds.
    #[serde(default)]
    pub token_ttl_overrides: HashMap<String, u64>,

    /// Password hashing cost (argon2 time cost).
    #[serde(default = "default_hash_cost")]
    pub hash_cost: u32,
}

const fn default_token_ttl() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

const fn default_hash_cost() -> u32 {
    DEFAULT_HASH_COST
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            shared_secret: None,
            token_ttl_secs: default_token_ttl(),
            token_ttl_overrides: HashMap::new(),
            hash_cost: default_hash_cost(),
        }
    }
}

impl AuthSettings {
    /// Create a new auth settings builder.
    #[must_use]
    pub fn builder() -> AuthSettingsBuilder {
        AuthSettingsBuilder::default()
    }

    /// Token lifetime for principals of the given kind.
    #[must_use]
    pub fn token_ttl(&self, kind: PrincipalKind) -> Duration {
        let secs = self
            .token_ttl_overrides
            .get(kind.as_str())
            .copied()
            .unwrap_or(self.token_ttl_secs);
        Duration::from_secs(secs)
    }

    /// The shared secret, which a running service cannot do without.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` if no secret is configured.
    pub fn require_secret(&self) -> Result<&SharedSecret, ConfigError> {
        let secret = self
            .shared_secret
            .as_ref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingField(ENV_SHARED_SECRET.to_string()))?;

        if secret.len() < RECOMMENDED_SECRET_LEN {
            tracing::warn!(
                length = secret.len(),
                "shared secret is shorter than {RECOMMENDED_SECRET_LEN} bytes"
            );
        }

        Ok(secret)
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(secret) = lookup(ENV_SHARED_SECRET) {
            self.shared_secret = Some(SharedSecret::from(secret));
        }

        if let Some(ttl) = lookup(ENV_TOKEN_TTL) {
            self.token_ttl_secs = parse_duration_secs(ENV_TOKEN_TTL, &ttl)?;
        }

        for kind in PrincipalKind::ALL {
            let name = format!("{ENV_TOKEN_TTL}_{}", kind.env_suffix());
            if let Some(ttl) = lookup(&name) {
                let secs = parse_duration_secs(&name, &ttl)?;
                self.token_ttl_overrides
                    .insert(kind.as_str().to_string(), secs);
            }
        }

        if let Some(cost) = lookup(ENV_HASH_COST) {
            self.hash_cost = cost.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("{ENV_HASH_COST} must be an integer, got {cost:?}"))
            })?;
        }

        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_HASH_COST).contains(&self.hash_cost) {
            return Err(ConfigError::Validation(format!(
                "hashCost must be between 1 and {MAX_HASH_COST}, got {}",
                self.hash_cost
            )));
        }

        if self.token_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "tokenTtlSecs must be positive".to_string(),
            ));
        }

        for (kind, secs) in &self.token_ttl_overrides {
            kind.parse::<PrincipalKind>()
                .map_err(|e| ConfigError::Validation(format!("tokenTtlOverrides: {e}")))?;
            if *secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "tokenTtlOverrides.{kind} must be positive"
                )));
            }
        }

        Ok(())
    }
}

/// Builder for `AuthSettings`.
#[derive(Debug, Default)]
pub struct AuthSettingsBuilder {
    settings: AuthSettings,
}

impl AuthSettingsBuilder {
    /// Set the shared secret.
    #[must_use]
    pub fn shared_secret(mut self, secret: impl Into<SharedSecret>) -> Self {
        self.settings.shared_secret = Some(secret.into());
        self
    }

    /// Set the default token lifetime.
    #[must_use]
    pub const fn token_ttl(mut self, ttl: Duration) -> Self {
        self.settings.token_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the token lifetime for one principal kind.
    #[must_use]
    pub fn token_ttl_for(mut self, kind: PrincipalKind, ttl: Duration) -> Self {
        self.settings
            .token_ttl_overrides
            .insert(kind.as_str().to_string(), ttl.as_secs());
        self
    }

    /// Set the password hashing cost.
    #[must_use]
    pub const fn hash_cost(mut self, cost: u32) -> Self {
        self.settings.hash_cost = cost;
        self
    }

    /// Build the settings.
    #[must_use]
    pub fn build(self) -> AuthSettings {
        self.settings
    }
}

/// Parse a lifetime such as `90s`, `30m`, `12h`, `7d`, or bare seconds.
///
/// # Errors
///
/// Returns `ConfigError::Validation` naming `name` if the value is malformed or zero.
pub fn parse_duration_secs(name: &str, value: &str) -> Result<u64, ConfigError> {
    let value = value.trim();
    let invalid = || ConfigError::Validation(format!("{name}: invalid duration {value:?}"));

    let (digits, unit) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], c),
        Some(_) => (value, 's'),
        None => return Err(invalid()),
    };

    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => return Err(invalid()),
    };

    match amount.checked_mul(multiplier) {
        Some(0) | None => Err(invalid()),
        Some(secs) => Ok(secs),
    }
}
