//! Token inspection.

use anyhow::Context;
use chrono::{DateTime, Utc};
use dishpatch_gateway::GatewayBuilder;
use serde_json::json;

use super::GlobalArgs;
use crate::ui;

/// Verify `token` against the configured secret and store, then show its claims.
///
/// # Errors
///
/// Returns error if the token does not verify or its principal is gone.
pub async fn run_inspect(global: &GlobalArgs, token: &str) -> anyhow::Result<()> {
    let config = global.load_config()?;
    let gateway = GatewayBuilder::new()
        .with_config(config)
        .build()
        .context("Failed to open credential store")?;
    let auth = &gateway.state().auth;

    let token = token.trim().trim_start_matches("Bearer ").trim();
    let claims = auth.verifier().decode(token).context("Token rejected")?;
    let context = auth.authenticate(Some(&format!("Bearer {token}"))).await?;

    let issued = timestamp(claims.iat);
    let expires = timestamp(claims.exp);

    if global.json {
        let value = json!({
            "principalId": context.principal_id,
            "role": context.role,
            "issuedAt": issued,
            "expiresAt": expires,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    ui::success("Token is valid");
    ui::kv("Principal", &context.principal_id.to_string());
    ui::kv("Role", &context.role.to_string());
    ui::kv("Issued", &display(issued));
    ui::kv("Expires", &display(expires));

    Ok(())
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn display(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339())
}
