//! Dishpatch CLI - run services and manage principals.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dishpatch_core::PrincipalKind;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "dishpatch")]
#[command(about = "Dishpatch - authentication for food-delivery services")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Machine-readable output (JSON results, JSON logs on stderr)
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ~/.dishpatch/dishpatch.json)
    #[arg(long, global = true, env = "DISHPATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a service
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Principal collection to host (repeatable)
        #[arg(long = "kind")]
        kinds: Vec<PrincipalKind>,
    },

    /// Administrator management
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },

    /// Shared secret utilities
    Secret {
        #[command(subcommand)]
        action: SecretCommands,
    },

    /// Token utilities
    Token {
        #[command(subcommand)]
        action: TokenCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create an administrator
    Create {
        /// Email for the new administrator
        #[arg(long)]
        email: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Password (or use --generate-password, or omit to be prompted)
        #[arg(long)]
        password: Option<String>,

        /// Generate a random password
        #[arg(long, conflicts_with = "password")]
        generate_password: bool,

        /// Grant the super-admin role
        #[arg(long = "super")]
        super_admin: bool,
    },

    /// List restaurant operators awaiting approval
    Pending,
}

#[derive(Subcommand)]
enum SecretCommands {
    /// Generate a new shared signing secret
    Generate,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Verify a token and show its claims
    Inspect {
        /// The token (without the `Bearer ` prefix)
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }

    let global = commands::GlobalArgs {
        config: cli.config,
        json: cli.json,
    };

    match cli.command {
        Commands::Serve { port, bind, kinds } => {
            let args = commands::serve::ServeArgs { port, bind, kinds };
            commands::run_serve(&global, args).await?;
        }

        Commands::Admin { action } => {
            let args = commands::admin::AdminArgs {
                action: match action {
                    AdminCommands::Create {
                        email,
                        name,
                        password,
                        generate_password,
                        super_admin,
                    } => commands::admin::AdminAction::Create {
                        email,
                        name,
                        password,
                        generate_password,
                        super_admin,
                    },
                    AdminCommands::Pending => commands::admin::AdminAction::Pending,
                },
            };
            commands::run_admin(&global, args).await?;
        }

        Commands::Secret { action } => match action {
            SecretCommands::Generate => commands::secret::run_generate(&global),
        },

        Commands::Token { action } => match action {
            TokenCommands::Inspect { token } => {
                commands::run_inspect(&global, &token).await?;
            }
        },
    }

    Ok(())
}
