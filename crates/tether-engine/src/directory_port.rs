//! Capability contract over the remote chat platform.

use std::collections::HashMap;

use async_trait::async_trait;
use tether_core::{GuildId, TextChannelId, UserId, VoiceChannelId};
use thiserror::Error;

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Live voice membership of one guild: voice channel id to occupant ids.
pub type GuildVoiceStates = HashMap<VoiceChannelId, Vec<UserId>>;

/// Errors returned by directory adapters.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("malformed platform id '{0}'")]
    MalformedId(String),
    #[error("directory request failed: {0}")]
    Unavailable(String),
}

/// Remote-platform operations the engine consumes.
///
/// Calls are non-transactional and may fail partially; callers decide per
/// call whether a failure aborts the operation or is tolerated. Existence
/// checks distinguish "definitely gone" from "could not tell": the latter is
/// an `Unavailable` error, never `false`.
#[async_trait]
pub trait DirectoryPort: Send + Sync {
    /// Creates the companion text channel for `voice` and returns its id.
    async fn create_text_channel_for_voice(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
    ) -> DirectoryResult<TextChannelId>;

    async fn delete_text_channel(&self, text: &TextChannelId) -> DirectoryResult<()>;

    async fn is_voice_channel_exists(&self, voice: &VoiceChannelId) -> DirectoryResult<bool>;

    async fn is_text_channel_exists(&self, text: &TextChannelId) -> DirectoryResult<bool>;

    /// Grants `user` view/post/read-history access on `text`. Idempotent.
    async fn add_member_to_text_channel(
        &self,
        guild: &GuildId,
        text: &TextChannelId,
        user: &UserId,
    ) -> DirectoryResult<()>;

    /// Revokes `user`'s access on `text`. Idempotent.
    async fn remove_member_from_text_channel(
        &self,
        guild: &GuildId,
        text: &TextChannelId,
        user: &UserId,
    ) -> DirectoryResult<()>;

    async fn get_voice_channel_member_count(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
    ) -> DirectoryResult<usize>;

    async fn get_guilds(&self) -> DirectoryResult<Vec<GuildId>>;

    async fn get_guild_voice_states(&self, guild: &GuildId) -> DirectoryResult<GuildVoiceStates>;

    /// Returns the users currently granted access on `text`.
    async fn get_text_channel_members(&self, text: &TextChannelId)
        -> DirectoryResult<Vec<UserId>>;
}
