//! Event-driven fast path: join, leave, and repair of voice/text links.

use std::sync::Arc;

use tether_core::{GuildId, LockKey, UserId, VoiceChannelId};
use tether_store::{KeyLockTable, LinkStore, VoiceTextLink};
use tracing::{debug, error, info, warn};

use crate::{DirectoryPort, EngineResult, VoiceStateUpdate};

/// How far a link teardown got.
///
/// The persisted record is always gone on the `Ok` path; `RecordOnly` means
/// the best-effort remote channel delete failed and the channel may linger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Complete,
    RecordOnly,
}

/// Handles live membership transitions for one engine instance.
///
/// Every mutating operation runs under the per-(guild, voice channel) lock,
/// held across remote calls, so concurrent events on the same channel cannot
/// race a create against a delete. Operations on distinct channels proceed in
/// parallel.
pub struct LinkLifecycle {
    store: Arc<dyn LinkStore>,
    directory: Arc<dyn DirectoryPort>,
    locks: Arc<KeyLockTable>,
}

impl LinkLifecycle {
    pub fn new(
        store: Arc<dyn LinkStore>,
        directory: Arc<dyn DirectoryPort>,
        locks: Arc<KeyLockTable>,
    ) -> Self {
        Self {
            store,
            directory,
            locks,
        }
    }

    /// Dispatches one gateway membership event.
    ///
    /// The leave side always runs before the join side so a user switching
    /// channels is deregistered from the old channel before the new channel's
    /// membership is read.
    pub async fn voice_state_update(&self, update: VoiceStateUpdate) -> EngineResult<()> {
        if update.before == update.after {
            return Ok(());
        }

        if let Some(before) = &update.before {
            let count = self
                .directory
                .get_voice_channel_member_count(&update.guild_id, before)
                .await?;
            self.leave_voice(&update.guild_id, before, &update.user_id, count == 0)
                .await?;
        }

        if let Some(after) = &update.after {
            self.join_voice(&update.guild_id, after, &update.user_id)
                .await?;
        }

        Ok(())
    }

    /// Registers `user` in the companion text channel of `voice`, creating or
    /// repairing the link as needed.
    pub async fn join_voice(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
        user: &UserId,
    ) -> EngineResult<()> {
        let key = LockKey::for_channel(guild, voice);
        let _guard = self.locks.acquire(&key).await?;

        let link = match self.store.find_by_voice_channel(guild, voice).await? {
            None => {
                let text = self
                    .directory
                    .create_text_channel_for_voice(guild, voice)
                    .await?;
                let link = VoiceTextLink::new(guild.clone(), voice.clone(), text)?;
                self.store.save(&link).await?;
                info!(
                    guild = %guild,
                    voice = %voice,
                    text = %link.text_channel_id(),
                    "created voice text link"
                );
                link
            }
            Some(mut link) => {
                if !self
                    .directory
                    .is_text_channel_exists(link.text_channel_id())
                    .await?
                {
                    warn!(
                        guild = %guild,
                        voice = %voice,
                        text = %link.text_channel_id(),
                        "bound text channel is gone, creating replacement"
                    );
                    let text = self
                        .directory
                        .create_text_channel_for_voice(guild, voice)
                        .await?;
                    link.change_text_channel(text)?;
                    self.store.save(&link).await?;
                }
                link
            }
        };

        self.directory
            .add_member_to_text_channel(guild, link.text_channel_id(), user)
            .await?;
        Ok(())
    }

    /// Deregisters `user` from the companion text channel; tears the link
    /// down when the last member left.
    pub async fn leave_voice(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
        user: &UserId,
        is_last_member: bool,
    ) -> EngineResult<()> {
        let key = LockKey::for_channel(guild, voice);
        let _guard = self.locks.acquire(&key).await?;

        let Some(link) = self.store.find_by_voice_channel(guild, voice).await? else {
            debug!(guild = %guild, voice = %voice, "no link for departed voice channel");
            return Ok(());
        };

        if is_last_member {
            // The event path does not distinguish a lingering remote channel;
            // the next sweep converges it either way.
            self.delete_linked_channel_and_record(&link).await?;
            return Ok(());
        }

        self.directory
            .remove_member_from_text_channel(guild, link.text_channel_id(), user)
            .await?;
        Ok(())
    }

    /// Tears down one stale link under its key lock: remote text-channel
    /// delete is best-effort, record delete is mandatory. Used by the sweep's
    /// cleanup phase.
    pub async fn cleanup_link(&self, link: &VoiceTextLink) -> EngineResult<CleanupOutcome> {
        let key = LockKey::for_channel(link.guild_id(), link.voice_channel_id());
        let _guard = self.locks.acquire(&key).await?;
        self.delete_linked_channel_and_record(link).await
    }

    /// Creates a link for a live voice channel discovered without one and
    /// grants access to every current occupant. Used by the sweep's create
    /// phase. Per-user grant failures are logged and skipped.
    pub async fn create_link_with_members(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
        users: &[UserId],
    ) -> EngineResult<()> {
        let key = LockKey::for_channel(guild, voice);
        let _guard = self.locks.acquire(&key).await?;

        let text = self
            .directory
            .create_text_channel_for_voice(guild, voice)
            .await?;
        let link = VoiceTextLink::new(guild.clone(), voice.clone(), text)?;
        self.store.save(&link).await?;

        for user in users {
            if let Err(error) = self
                .directory
                .add_member_to_text_channel(guild, link.text_channel_id(), user)
                .await
            {
                error!(
                    %error,
                    guild = %guild,
                    text = %link.text_channel_id(),
                    user = %user,
                    "failed to grant text channel access"
                );
            }
        }

        info!(
            guild = %guild,
            voice = %voice,
            text = %link.text_channel_id(),
            users = users.len(),
            "created voice text link from sweep"
        );
        Ok(())
    }

    async fn delete_linked_channel_and_record(
        &self,
        link: &VoiceTextLink,
    ) -> EngineResult<CleanupOutcome> {
        // The remote channel may already be gone; only the record delete is
        // allowed to fail the operation.
        let outcome = match self
            .directory
            .delete_text_channel(link.text_channel_id())
            .await
        {
            Ok(()) => CleanupOutcome::Complete,
            Err(error) => {
                warn!(
                    %error,
                    text = %link.text_channel_id(),
                    "failed to delete text channel, it may already be gone"
                );
                CleanupOutcome::RecordOnly
            }
        };

        self.store.delete(link.id()).await?;
        info!(
            guild = %link.guild_id(),
            voice = %link.voice_channel_id(),
            text = %link.text_channel_id(),
            "removed voice text link"
        );
        Ok(outcome)
    }
}
