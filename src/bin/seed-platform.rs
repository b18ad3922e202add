//! Platform bootstrap
//!
//! Installs the default plan catalog and registers platform administrators.
//!
//! Usage:
//!   DATABASE_URL=... ./seed-platform plans [--overwrite]
//!   DATABASE_URL=... ./seed-platform admin --email ops@indivio.app --name "Ops" [--password ...]
//!
//! Without `--password` a password is generated and printed once, unless
//! `--federated-only` is given.

use std::{env, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use indivio_admin::{
    db,
    services::{auth::AuthService, credentials, plans::PlanCatalog},
    store::{postgres::PgDocumentStore, DocumentStore},
};

#[derive(Parser)]
#[command(name = "seed-platform", about = "Bootstrap the Indivio platform configuration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install the Normal, Pro and Ultra tiers.
    Plans {
        /// Replace an existing catalog.
        #[arg(long)]
        overwrite: bool,
    },
    /// Create or replace a platform administrator.
    Admin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, conflicts_with = "federated_only")]
        password: Option<String>,
        /// Allow Google Sign-In only.
        #[arg(long)]
        federated_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();
    let cli = Cli::parse();
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool));

    match cli.command {
        Command::Plans { overwrite } => {
            let catalog = PlanCatalog::new(store);
            if catalog.seed_defaults(overwrite).await? {
                println!("Plan catalog installed.");
            } else {
                println!("Plan catalog already present; use --overwrite to replace it.");
            }
        }
        Command::Admin {
            email,
            name,
            password,
            federated_only,
        } => {
            // No tokens are issued here, only the admin record is written.
            let auth = AuthService::new(store, String::new(), 0);
            let generated = match (&password, federated_only) {
                (None, false) => Some(credentials::generate_password(16)),
                _ => None,
            };
            let secret = password.as_deref().or(generated.as_deref());
            let admin = auth.create_admin(&email, &name, secret).await?;

            println!("Platform admin {} saved.", admin.email);
            if let Some(generated) = generated {
                println!("Generated password (shown once): {generated}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_subcommand_parses_without_other_settings() {
        let cli = Cli::try_parse_from(["seed-platform", "plans", "--overwrite"]).unwrap();
        assert!(matches!(cli.command, Command::Plans { overwrite: true }));
    }

    #[test]
    fn admin_password_conflicts_with_federated_only() {
        assert!(Cli::try_parse_from([
            "seed-platform", "admin", "--email", "ops@indivio.app", "--name", "Ops",
            "--password", "secret", "--federated-only",
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "seed-platform", "admin", "--email", "ops@indivio.app", "--name", "Ops", "--federated-only",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Admin { federated_only: true, password: None, .. }));
    }
}
