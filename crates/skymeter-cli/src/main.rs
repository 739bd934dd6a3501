//! Admin CLI for the skymeter gateway
//!
//! Operates directly on the gateway database: initialize the schema,
//! inspect plans and quota status, and manage accounts. List output is
//! JSON so it pipes cleanly into other tooling.

use clap::{Parser, Subcommand};
use skymeter_api::accounts::AccountStore;
use skymeter_api::auth::AuthGate;
use skymeter_api::plans::PlanCatalog;
use skymeter_core::Result;
use skymeter_storage::{GatewayBackend, LocalSqliteBackend};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "skymeter", about = "Administer a skymeter gateway database")]
struct Cli {
    /// Path to the gateway SQLite database
    #[arg(long, default_value = "skymeter.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new gateway database
    Init,
    /// List the plan catalog
    Plans,
    /// Show an account's quota status by API key
    Status {
        /// API key to look up
        key: String,
    },
    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountCommand,
    },
}

#[derive(Subcommand)]
enum AccountCommand {
    /// List all accounts as JSON
    List,
    /// Register an account (idempotent per email) and print its API key
    Create {
        email: String,
        #[arg(long, default_value = "Free")]
        plan: String,
    },
    /// Delete an account
    Delete { email: String },
    /// Override an account's plan
    SetPlan { email: String, plan: String },
    /// Issue a replacement API key, invalidating the old one
    ResetKey { email: String },
}

fn run(cli: Cli) -> Result<()> {
    let backend = Arc::new(LocalSqliteBackend::new(&cli.db));

    match cli.command {
        Command::Init => {
            backend.initialize()?;
            println!("Initialized gateway database at {:?}", cli.db);
        }
        Command::Plans => {
            let catalog = PlanCatalog::new(backend);
            for plan in catalog.list()? {
                println!("{}\t{} requests/day", plan.name, plan.daily_limit);
            }
        }
        Command::Status { key } => {
            let gate = AuthGate::new(backend);
            let status = gate.status_for(&key)?;
            println!("{}", serde_json::to_string_pretty(&status).expect("status serializes"));
        }
        Command::Account { action } => {
            let store = AccountStore::new(backend);
            match action {
                AccountCommand::List => {
                    let accounts = store.list_all()?;
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&accounts).expect("accounts serialize")
                    );
                }
                AccountCommand::Create { email, plan } => {
                    let account = store.create(&email, &plan)?;
                    println!("{}\t{}\t{}", account.email, account.plan, account.key);
                }
                AccountCommand::Delete { email } => {
                    store.delete(&email)?;
                    println!("Deleted account {}", email);
                }
                AccountCommand::SetPlan { email, plan } => {
                    let account = store.update_plan_by_email(&email, &plan)?;
                    println!("Plan for {} set to {}", account.email, account.plan);
                }
                AccountCommand::ResetKey { email } => {
                    let new_key = store.replace_key_for_email(&email)?;
                    println!("New API key for {}: {}", email, new_key);
                }
            }
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
