//! Gateway client entrypoint and shutdown handling.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serenity::all::{Client, GatewayIntents};
use tether_store::{KeyLockTable, LinkStore};
use tracing::info;

use crate::EventRouter;

/// Runtime settings for one bot session.
#[derive(Debug, Clone)]
pub struct DiscordRuntimeConfig {
    pub token: String,
    pub skip_startup_sync: bool,
}

/// Runs the gateway session until it terminates or a shutdown signal arrives.
pub async fn run_discord_runtime(
    config: DiscordRuntimeConfig,
    store: Arc<dyn LinkStore>,
    locks: Arc<KeyLockTable>,
) -> Result<()> {
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let router = EventRouter::new(store, locks, config.skip_startup_sync);

    let mut client = Client::builder(&config.token, intents)
        .event_handler(router)
        .await
        .context("failed to build discord client")?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, stopping gateway");
        shard_manager.shutdown_all().await;
    });

    client
        .start()
        .await
        .context("discord gateway terminated with an error")
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            tracing::warn!(%error, "failed to install SIGTERM handler, using ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
