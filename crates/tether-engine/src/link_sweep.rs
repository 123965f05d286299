//! Full-platform consistency sweep over every guild and persisted link.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tether_core::{GuildId, VoiceChannelId};
use tether_store::LinkStore;
use tracing::{error, info, warn};

use crate::{
    CleanupOutcome, DirectoryPort, EngineResult, GuildVoiceStates, LinkLifecycle,
    PermissionReconciler,
};

/// Aggregate outcome of one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale links removed (guild gone, voice channel gone, or empty).
    pub cleaned: u64,
    /// Surviving links whose access list was reconciled.
    pub synced: u64,
    /// Links created for live voice channels discovered without a record.
    pub created: u64,
    /// Per-link failures tolerated without aborting the sweep.
    pub errors: u64,
}

/// Reconciles persisted links against live remote state in four phases:
/// collect, cleanup, reconcile, create.
///
/// The sweep never locks globally; every cleanup/create sub-step goes through
/// the lifecycle service and takes its own per-channel lock, so it may
/// interleave with concurrent live events. Both paths are idempotent, which
/// makes eventual convergence the correctness guarantee.
pub struct LinkSweep {
    store: Arc<dyn LinkStore>,
    directory: Arc<dyn DirectoryPort>,
    lifecycle: Arc<LinkLifecycle>,
    reconciler: PermissionReconciler,
}

impl LinkSweep {
    pub fn new(
        store: Arc<dyn LinkStore>,
        directory: Arc<dyn DirectoryPort>,
        lifecycle: Arc<LinkLifecycle>,
    ) -> Self {
        let reconciler = PermissionReconciler::new(directory.clone());
        Self {
            store,
            directory,
            lifecycle,
            reconciler,
        }
    }

    /// Runs one sweep to completion and returns the aggregate counts.
    ///
    /// Only the initial guild enumeration and link listing are fatal; every
    /// later failure is counted and the sweep continues.
    pub async fn run(&self) -> EngineResult<SweepReport> {
        info!("link sweep started");

        let guilds = self.directory.get_guilds().await?;
        let links = self.store.find_all().await?;
        info!(
            guilds = guilds.len(),
            links = links.len(),
            "link sweep collected state"
        );

        let guild_set: HashSet<&GuildId> = guilds.iter().collect();
        let mut live: HashMap<GuildId, GuildVoiceStates> = HashMap::new();
        for guild in &guilds {
            match self.directory.get_guild_voice_states(guild).await {
                Ok(states) => {
                    live.insert(guild.clone(), states);
                }
                Err(error) => {
                    warn!(%error, guild = %guild, "skipping guild, failed to fetch voice states");
                }
            }
        }

        let linked: HashSet<(&GuildId, &VoiceChannelId)> = links
            .iter()
            .map(|link| (link.guild_id(), link.voice_channel_id()))
            .collect();
        let mut report = SweepReport::default();

        for link in &links {
            if !guild_set.contains(link.guild_id()) {
                warn!(
                    guild = %link.guild_id(),
                    voice = %link.voice_channel_id(),
                    "guild is gone, removing link"
                );
                self.cleanup_counted(link, &mut report).await;
                continue;
            }

            match self
                .directory
                .is_voice_channel_exists(link.voice_channel_id())
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        guild = %link.guild_id(),
                        voice = %link.voice_channel_id(),
                        "voice channel is gone, removing link"
                    );
                    self.cleanup_counted(link, &mut report).await;
                    continue;
                }
                Err(error) => {
                    error!(
                        %error,
                        guild = %link.guild_id(),
                        voice = %link.voice_channel_id(),
                        "failed to check voice channel existence"
                    );
                    report.errors += 1;
                    continue;
                }
            }

            // Voice-state fetch failed for this guild; leave the link alone
            // until a later sweep can see its membership.
            let Some(states) = live.get(link.guild_id()) else {
                continue;
            };

            let members = states
                .get(link.voice_channel_id())
                .map(Vec::as_slice)
                .unwrap_or_default();
            if members.is_empty() {
                warn!(
                    guild = %link.guild_id(),
                    voice = %link.voice_channel_id(),
                    "voice channel is empty, removing link"
                );
                self.cleanup_counted(link, &mut report).await;
                continue;
            }

            match self.reconciler.reconcile(link, members).await {
                Ok(()) => report.synced += 1,
                Err(error) => {
                    error!(
                        %error,
                        guild = %link.guild_id(),
                        voice = %link.voice_channel_id(),
                        "failed to reconcile link access"
                    );
                    report.errors += 1;
                }
            }
        }

        for (guild, states) in &live {
            for (voice, users) in states {
                if users.is_empty() || linked.contains(&(guild, voice)) {
                    continue;
                }
                match self
                    .lifecycle
                    .create_link_with_members(guild, voice, users)
                    .await
                {
                    Ok(()) => report.created += 1,
                    Err(error) => {
                        error!(
                            %error,
                            guild = %guild,
                            voice = %voice,
                            "failed to create link"
                        );
                        report.errors += 1;
                    }
                }
            }
        }

        info!(
            cleaned = report.cleaned,
            synced = report.synced,
            created = report.created,
            errors = report.errors,
            "link sweep completed"
        );
        Ok(report)
    }

    async fn cleanup_counted(&self, link: &tether_store::VoiceTextLink, report: &mut SweepReport) {
        match self.lifecycle.cleanup_link(link).await {
            Ok(CleanupOutcome::Complete) => report.cleaned += 1,
            Ok(CleanupOutcome::RecordOnly) => {
                report.cleaned += 1;
                report.errors += 1;
            }
            Err(error) => {
                error!(
                    %error,
                    guild = %link.guild_id(),
                    voice = %link.voice_channel_id(),
                    "failed to clean up link"
                );
                report.errors += 1;
            }
        }
    }
}
