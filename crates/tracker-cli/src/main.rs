use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracker_core::paths;
use tracker_core::{TrackerConfig, TrackerStore};

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Local store maintenance for the GitHub activity tracker", long_about = None)]
struct Cli {
    /// Data directory (overrides TRACKER_DATA_DIR and the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to config.json in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations and register this machine
    Init,

    /// Show migration, credential and cache state
    Status,

    /// Store a username and, optionally, an encrypted access token
    Login {
        #[arg(long)]
        username: String,

        /// Access token; prompted for when omitted
        #[arg(long, conflicts_with = "no_token")]
        token: Option<String>,

        /// Store the username only
        #[arg(long)]
        no_token: bool,
    },

    /// Remove stored credentials
    Logout,

    /// Check that the stored token decrypts
    Token {
        /// Print the plaintext token
        #[arg(long)]
        reveal: bool,
    },

    /// List pending sync queue items
    Queue,

    /// Wipe all organization data and the migration version
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (data_dir, config) = load_config(&cli)?;
    init_tracing(&config);
    tracing::debug!(data_dir = %data_dir.display(), "resolved data directory");

    let store = TrackerStore::open_at(&data_dir, &config)
        .with_context(|| format!("opening store in {}", data_dir.display()))?;

    match cli.command {
        Commands::Init => {
            let report = store.startup();
            print_json(&report)?;
            if !report.migration.success {
                bail!("migration failed; run `tracker reset --yes` to start over");
            }
        }
        Commands::Status => status_command(&store, &data_dir)?,
        Commands::Login {
            username,
            token,
            no_token,
        } => {
            store.startup();
            let token = match (token, no_token) {
                (Some(token), _) => Some(token),
                (None, true) => None,
                (None, false) => Some(
                    rpassword::prompt_password("GitHub token: ")
                        .map_err(|e| anyhow!("token prompt: {e}"))?,
                ),
            };
            let credential = store
                .auth()
                .login(&username, token.as_deref())
                .await
                .context("login failed")?;
            print_json(&json!({
                "username": credential.username,
                "hasToken": credential.encrypted_token.is_some(),
            }))?;
        }
        Commands::Logout => {
            store.auth().clear();
            print_json(&json!({ "loggedOut": true }))?;
        }
        Commands::Token { reveal } => {
            store.startup();
            let token = store.auth().decrypted_token().await;
            let shown = token.as_deref().map(|t| if reveal { t.to_string() } else { mask(t) });
            print_json(&json!({
                "present": token.is_some(),
                "token": shown,
            }))?;
        }
        Commands::Queue => {
            store.startup();
            print_json(&store.sync_queue().items())?;
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("refusing to reset organization data without --yes");
            }
            let removed = store.migrations().reset_organization_data();
            print_json(&json!({ "removed": removed }))?;
        }
    }
    Ok(())
}

/// Data directory: flag, then `TRACKER_DATA_DIR`, then config, then platform.
fn load_config(cli: &Cli) -> Result<(PathBuf, TrackerConfig)> {
    let base = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => paths::data_dir()?,
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| paths::config_path(&base));
    let config = TrackerConfig::load_or_default(&config_path)
        .with_context(|| format!("reading config {}", config_path.display()))?;
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => config.resolve_data_dir()?,
    };
    Ok((data_dir, config))
}

fn init_tracing(config: &TrackerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn status_command(store: &TrackerStore, data_dir: &std::path::Path) -> Result<()> {
    let credential = store.auth().credentials();
    let organization = store.organization();
    let local = store.local();
    print_json(&json!({
        "dataDir": data_dir,
        "migration": store.migrations().status(),
        "machine": store.machine().info(),
        "user": credential.as_ref().map(|c| &c.username),
        "hasToken": credential.as_ref().is_some_and(|c| c.encrypted_token.is_some()),
        "tags": organization.tags().len(),
        "projects": organization.project_organizations().len(),
        "lastSync": organization.last_sync_at(),
        "pendingSync": store.sync_queue().len(),
        "cacheBytes": local.cache_size(),
        "cacheFull": local.is_cache_full(),
    }))
}

/// First four characters then `****`. Short tokens are hidden entirely.
fn mask(token: &str) -> String {
    if token.chars().count() <= 4 {
        return "****".into();
    }
    let visible: String = token.chars().take(4).collect();
    format!("{visible}****")
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
