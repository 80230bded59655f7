//! Administrator management commands.
//!
//! These open the credential store directly, so they cannot run while a
//! service holds the same data directory.

use std::fs;

use anyhow::Context;
use dishpatch_core::{Config, Password, PrincipalKind};
use dishpatch_gateway::GatewayBuilder;
use dishpatch_gateway::auth::{
    ApprovalState, CredentialStore, PrincipalRecord, Profile, RegistrationForm,
    SledCredentialStore,
};
use rand::Rng;
use serde_json::json;

use super::GlobalArgs;
use crate::ui;

/// Length of generated passwords.
const GENERATED_PASSWORD_LEN: usize = 20;

/// Arguments for admin commands.
pub struct AdminArgs {
    /// The admin action to perform.
    pub action: AdminAction,
}

/// Admin actions.
pub enum AdminAction {
    /// Create an administrator.
    Create {
        email: String,
        name: String,
        password: Option<String>,
        generate_password: bool,
        super_admin: bool,
    },
    /// List operators awaiting approval.
    Pending,
}

/// Run the admin command.
///
/// # Errors
///
/// Returns error if the store cannot be opened or the operation fails.
pub async fn run_admin(global: &GlobalArgs, args: AdminArgs) -> anyhow::Result<()> {
    let config = global.load_config()?;

    match args.action {
        AdminAction::Create {
            email,
            name,
            password,
            generate_password: gen_pwd,
            super_admin,
        } => {
            let password = if gen_pwd {
                Generated::Yes(generate_password(GENERATED_PASSWORD_LEN))
            } else if let Some(password) = password {
                Generated::No(password)
            } else {
                Generated::No(ui::prompts::password_with_confirm("Password")?)
            };

            create_admin(global, config, email, name, password, super_admin).await
        }
        AdminAction::Pending => list_pending(global, &config).await,
    }
}

enum Generated {
    Yes(String),
    No(String),
}

async fn create_admin(
    global: &GlobalArgs,
    config: Config,
    email: String,
    name: String,
    password: Generated,
    super_admin: bool,
) -> anyhow::Result<()> {
    let gateway = GatewayBuilder::new()
        .with_config(config)
        .build()
        .context("Failed to open credential store")?;

    let (plaintext, generated) = match password {
        Generated::Yes(p) => (p.clone(), Some(p)),
        Generated::No(p) => (p, None),
    };

    let form = RegistrationForm {
        email: Some(email),
        password: Some(Password::new(plaintext)),
        name: Some(name),
        ..RegistrationForm::default()
    };

    let outcome = gateway.state().auth.bootstrap_admin(form, super_admin).await?;

    if global.json {
        let mut value = serde_json::to_value(&outcome)?;
        if let Some(password) = generated {
            value["generatedPassword"] = json!(password);
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let principal = &outcome.principal;
    ui::success(&format!(
        "Created {} '{}' ({})",
        principal.role, principal.email, principal.id
    ));
    if let Some(password) = generated {
        ui::success(&format!("Generated password: {password}"));
    }
    ui::kv("Token", &outcome.token);
    ui::kv("Expires", &outcome.expires_at.to_rfc3339());

    Ok(())
}

async fn list_pending(global: &GlobalArgs, config: &Config) -> anyhow::Result<()> {
    let data_dir = &config.service.data_dir;
    fs::create_dir_all(data_dir)?;
    let store = SledCredentialStore::open(data_dir).with_context(|| {
        format!("Failed to open credential store in {}", data_dir.display())
    })?;

    let mut pending: Vec<PrincipalRecord> = store
        .list(PrincipalKind::RestaurantOperator)
        .await?
        .into_iter()
        .filter(|r| r.approval().is_some_and(|a| a.state == ApprovalState::Pending))
        .collect();
    pending.sort_by_key(|r| r.created_at);

    if global.json {
        let public: Vec<_> = pending.iter().map(PrincipalRecord::to_public).collect();
        println!("{}", serde_json::to_string_pretty(&public)?);
        return Ok(());
    }

    if pending.is_empty() {
        ui::info("No restaurant operators awaiting approval.");
        return Ok(());
    }

    ui::info(&format!("Pending restaurant operators ({}):", pending.len()));
    println!();
    println!(
        "{:<38} {:<28} {:<24} {:<20}",
        "ID", "EMAIL", "RESTAURANT", "REGISTERED"
    );
    println!("{}", "-".repeat(110));

    for record in pending {
        let restaurant = match &record.profile {
            Profile::RestaurantOperator {
                restaurant_name, ..
            } => restaurant_name.as_str(),
            _ => "",
        };
        let created = record.created_at.format("%Y-%m-%d %H:%M:%S");
        println!(
            "{:<38} {:<28} {:<24} {:<20}",
            record.id.to_string(),
            record.identifier,
            restaurant,
            created.to_string()
        );
    }

    Ok(())
}

/// Generate a random alphanumeric password.
#[must_use]
pub fn generate_password(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
