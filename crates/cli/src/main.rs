//! Clementine CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run billing database migrations
//! cl-cli migrate billing
//!
//! # Recompute the store visibility projection from subscription state
//! cl-cli visibility sync
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `visibility sync` - Repair the denormalized `is_paid` flag

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cl-cli")]
#[command(author, version, about = "Clementine CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Manage the store visibility projection
    Visibility {
        #[command(subcommand)]
        action: VisibilityAction,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Run billing database migrations
    Billing,
}

#[derive(Subcommand)]
enum VisibilityAction {
    /// Recompute `is_paid` for every store from its subscriptions
    Sync,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate { target } => match target {
            MigrateTarget::Billing => commands::migrate::billing().await?,
        },
        Commands::Visibility { action } => match action {
            VisibilityAction::Sync => commands::visibility::sync().await?,
        },
    }
    Ok(())
}
