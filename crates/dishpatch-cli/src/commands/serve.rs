//! Serve command - run a Dishpatch service.

use anyhow::Result;
use dishpatch_core::PrincipalKind;

use super::GlobalArgs;
use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port to listen on.
    pub port: Option<u16>,
    /// Bind address.
    pub bind: Option<String>,
    /// Hosted collections; empty keeps the configured ones.
    pub kinds: Vec<PrincipalKind>,
}

/// Start the service and block until Ctrl-C.
pub async fn run_serve(global: &GlobalArgs, args: ServeArgs) -> Result<()> {
    let mut config = global.load_config()?;

    if let Some(port) = args.port {
        config.service.port = port;
    }
    if let Some(bind) = args.bind {
        config.service.bind_address = bind;
    }
    if !args.kinds.is_empty() {
        config.service.principal_kinds = args.kinds;
    }

    if config.auth.shared_secret.is_none() {
        ui::error("No shared secret configured");
        ui::info("Run 'dishpatch secret generate' and export it as SHARED_SECRET");
        anyhow::bail!("shared secret is required");
    }

    if !global.json {
        let service = &config.service;
        let kinds: Vec<&str> = service
            .principal_kinds
            .iter()
            .map(|k| k.as_str())
            .collect();

        ui::header(&format!("Starting {}", service.name));
        ui::kv("Address", &format!("{}:{}", service.bind_address, service.port));
        ui::kv("Collections", &kinds.join(", "));
        ui::kv("Data", &service.data_dir.display().to_string());
        println!();
    }

    dishpatch_gateway::start(config).await?;
    Ok(())
}
