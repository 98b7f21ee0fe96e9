mod commands;
mod config;
mod firestore;

use std::path::PathBuf;
use std::process;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::commands::{cmd_add_user, cmd_goals, cmd_import_cofid, cmd_seed};
use crate::config::{Config, DEFAULT_CREDENTIALS_FILE, ServiceAccount};
use crate::firestore::FirestoreClient;
use goalseed_core::db::LocalStore;
use goalseed_core::reconcile::{CompletenessCheck, DEFAULT_PAGE_SIZE, ReconcileOptions};
use goalseed_core::store::DocumentStore;

#[derive(Parser)]
#[command(
    name = "goalseed",
    version,
    about = "Seed default nutrition, water and sleep goals for every user"
)]
struct Cli {
    /// Where user and goal documents live
    #[arg(long, value_enum, default_value_t = Backend::Firestore, global = true)]
    backend: Backend,
    /// Local store path (local backend; default: per-user data directory)
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,
    /// Service account key file, read for its project id
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CREDENTIALS_FILE, global = true)]
    credentials: PathBuf,
    /// Firestore project id (overrides the one in the credentials file)
    #[arg(long, global = true)]
    project: Option<String>,
    /// OAuth access token for Firestore
    #[arg(long, env = "GOALSEED_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,
    /// Talk to a local Firestore emulator at HOST:PORT
    #[arg(long, env = "FIRESTORE_EMULATOR_HOST", global = true)]
    emulator_host: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Local `SQLite` document store
    Local,
    /// Cloud Firestore (or its emulator)
    Firestore,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or complete the goal record of every user
    Seed {
        /// Treat 0, false and "" macro values as missing and overwrite them
        #[arg(long)]
        legacy_falsy: bool,
        /// Users reconciled at once (1 = sequential)
        #[arg(short, long, default_value = "1")]
        concurrency: usize,
        /// Users fetched per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a user's goal record
    Goals {
        /// User id
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a user document
    AddUser {
        /// User id
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import foods from a CSV export of the `CoFID` proximates sheet
    ImportCofid {
        /// Path to the CSV file
        file: PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(cli: &Cli) -> Result<Box<dyn DocumentStore>> {
    match cli.backend {
        Backend::Local => {
            let path = match &cli.db {
                Some(path) => path.clone(),
                None => Config::load()?.db_path,
            };
            info!(path = %path.display(), "using local store");
            Ok(Box::new(LocalStore::open(&path)?))
        }
        Backend::Firestore => {
            let project_id = match &cli.project {
                Some(project) if !project.trim().is_empty() => project.trim().to_string(),
                Some(_) => bail!("--project must not be empty"),
                None => {
                    let account = ServiceAccount::load(&cli.credentials)?;
                    if let Some(email) = &account.client_email {
                        info!(client_email = email.as_str(), "loaded service account");
                    }
                    account.project_id
                }
            };
            info!(
                project = project_id.as_str(),
                emulator = cli.emulator_host.as_deref(),
                "connecting to Firestore"
            );
            let client = FirestoreClient::new(
                &project_id,
                cli.access_token.clone(),
                cli.emulator_host.as_deref(),
            )?;
            Ok(Box::new(client))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let store = open_store(&cli)?;
    let store = store.as_ref();

    match cli.command {
        Commands::Seed {
            legacy_falsy,
            concurrency,
            page_size,
            dry_run,
            json,
        } => {
            let options = ReconcileOptions {
                check: if legacy_falsy {
                    CompletenessCheck::Truthy
                } else {
                    CompletenessCheck::Presence
                },
                page_size,
                concurrency,
                dry_run,
            };
            cmd_seed(store, options, json).await
        }
        Commands::Goals { user_id, json } => cmd_goals(store, &user_id, json).await,
        Commands::AddUser { user_id, json } => cmd_add_user(store, &user_id, json).await,
        Commands::ImportCofid {
            file,
            dry_run,
            json,
        } => cmd_import_cofid(store, &file, dry_run, json).await,
    }
}
