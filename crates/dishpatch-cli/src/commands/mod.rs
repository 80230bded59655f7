//! CLI command implementations.

pub mod admin;
pub mod secret;
pub mod serve;
pub mod token;

use std::path::PathBuf;

use anyhow::Context;
use dishpatch_core::Config;
use tracing::debug;

pub use admin::run_admin;
pub use serve::run_serve;
pub use token::run_inspect;

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file override.
    pub config: Option<PathBuf>,
    /// Print results as JSON.
    pub json: bool,
}

impl GlobalArgs {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::load_default().context("Failed to load config")?,
        };

        let config = config
            .with_env_overrides()
            .context("Invalid environment override")?;
        debug!(
            path = ?self.config,
            data_dir = %config.service.data_dir.display(),
            "Loaded configuration"
        );
        Ok(config)
    }
}
