//! Tether binary entrypoint.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tether_discord_runtime::{run_discord_runtime, DiscordRuntimeConfig};
use tether_store::{KeyLockTable, SqliteLinkStore};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "tether",
    about = "Keeps Discord voice channels paired with private companion text channels",
    version
)]
struct Cli {
    #[arg(
        long = "discord-token",
        env = "DISCORD_TOKEN",
        hide_env_values = true,
        help = "Bot token used to authenticate the gateway session"
    )]
    discord_token: String,

    #[arg(
        long = "db-path",
        env = "TETHER_DB_PATH",
        default_value = "tether.sqlite3",
        help = "Path to the SQLite database holding voice-text links"
    )]
    db_path: PathBuf,

    #[arg(
        long = "skip-startup-sync",
        help = "Do not run the full link sweep when the gateway session becomes ready"
    )]
    skip_startup_sync: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let store = SqliteLinkStore::new(&cli.db_path)
        .with_context(|| format!("failed to open link store at {}", cli.db_path.display()))?;
    info!(db_path = %cli.db_path.display(), "link store ready");

    let config = DiscordRuntimeConfig {
        token: cli.discord_token,
        skip_startup_sync: cli.skip_startup_sync,
    };
    run_discord_runtime(config, Arc::new(store), Arc::new(KeyLockTable::new())).await
}
