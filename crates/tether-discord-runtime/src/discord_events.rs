//! Gateway event routing into the reconciliation engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{Context, EventHandler, Ready, VoiceState};
use tether_core::{GuildId, UserId, VoiceChannelId};
use tether_engine::{DirectoryPort, LinkLifecycle, LinkSweep, VoiceStateUpdate};
use tether_store::{KeyLockTable, LinkStore};
use tracing::{debug, error, info, warn};

use crate::DiscordDirectory;

/// Routes serenity gateway events to the lifecycle service and the sweep.
///
/// Engine services are assembled per event from the session's HTTP client and
/// cache; they are thin wrappers over shared `Arc`s, so this costs nothing
/// and avoids init-order coupling with the client builder.
pub struct EventRouter {
    store: Arc<dyn LinkStore>,
    locks: Arc<KeyLockTable>,
    skip_startup_sync: bool,
    startup_sync_started: AtomicBool,
}

impl EventRouter {
    pub fn new(store: Arc<dyn LinkStore>, locks: Arc<KeyLockTable>, skip_startup_sync: bool) -> Self {
        Self {
            store,
            locks,
            skip_startup_sync,
            startup_sync_started: AtomicBool::new(false),
        }
    }

    fn lifecycle(&self, ctx: &Context) -> Arc<LinkLifecycle> {
        let directory: Arc<dyn DirectoryPort> =
            Arc::new(DiscordDirectory::new(ctx.http.clone(), ctx.cache.clone()));
        Arc::new(LinkLifecycle::new(
            self.store.clone(),
            directory,
            self.locks.clone(),
        ))
    }

    fn sweep(&self, ctx: &Context) -> LinkSweep {
        let directory: Arc<dyn DirectoryPort> =
            Arc::new(DiscordDirectory::new(ctx.http.clone(), ctx.cache.clone()));
        let lifecycle = Arc::new(LinkLifecycle::new(
            self.store.clone(),
            directory.clone(),
            self.locks.clone(),
        ));
        LinkSweep::new(self.store.clone(), directory, lifecycle)
    }
}

#[async_trait]
impl EventHandler for EventRouter {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "gateway session ready"
        );

        if self.skip_startup_sync {
            return;
        }
        // Ready fires again on reconnect; only the first session runs the
        // startup sweep.
        if self.startup_sync_started.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.sweep(&ctx).run().await {
            Ok(report) => info!(
                cleaned = report.cleaned,
                synced = report.synced,
                created = report.created,
                errors = report.errors,
                "startup link sweep completed"
            ),
            Err(error) => warn!(%error, "startup link sweep failed"),
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild) = new.guild_id else {
            return;
        };
        if new.user_id == ctx.cache.current_user().id {
            return;
        }

        let update = VoiceStateUpdate {
            guild_id: GuildId::new(guild.to_string()),
            before: old
                .as_ref()
                .and_then(|state| state.channel_id)
                .map(|channel| VoiceChannelId::new(channel.to_string())),
            after: new
                .channel_id
                .map(|channel| VoiceChannelId::new(channel.to_string())),
            user_id: UserId::new(new.user_id.to_string()),
        };
        debug!(
            guild = %update.guild_id,
            user = %update.user_id,
            before = update.before.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            after = update.after.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            "voice state update"
        );

        // A failed event is dropped; the next event or sweep converges it.
        if let Err(error) = self.lifecycle(&ctx).voice_state_update(update).await {
            error!(%error, "failed to handle voice state update");
        }
    }
}
