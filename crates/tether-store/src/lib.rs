//! Persistence port for voice/text link records.
//!
//! Defines the `LinkStore` contract plus two backends: a durable SQLite store
//! and an in-memory store used by engine tests and ephemeral deployments. The
//! per-channel serializing lock that frames every lifecycle operation lives
//! here as well, since it is part of the persistence unit-of-work contract.

use std::collections::HashMap;

use async_trait::async_trait;
use tether_core::{GuildId, LinkId, TextChannelId, VoiceChannelId};
use thiserror::Error;
use tokio::sync::RwLock;

mod key_lock;
mod link_model;
mod sqlite;

pub use key_lock::{KeyLockGuard, KeyLockTable};
pub use link_model::VoiceTextLink;
pub use sqlite::SqliteLinkStore;

/// Result type for link store operations.
pub type StoreResult<T> = Result<T, LinkStoreError>;

/// Errors returned by link store backends and the link model.
#[derive(Debug, Error)]
pub enum LinkStoreError {
    #[error("link '{0}' not found")]
    LinkNotFound(String),
    #[error("link id must not be empty")]
    EmptyLinkId,
    #[error("guild id must not be empty")]
    EmptyGuildId,
    #[error("voice channel id must not be empty")]
    EmptyVoiceChannelId,
    #[error("text channel id must not be empty")]
    EmptyTextChannelId,
    #[error("a link already exists for guild '{guild}' voice channel '{voice}'")]
    DuplicateLink { guild: String, voice: String },
    #[error("key lock table is poisoned")]
    LockTablePoisoned,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Async store contract over persisted voice/text links.
///
/// A missing record on the find paths is expected control flow and surfaces as
/// `None`; only deleting an unknown id reports `LinkNotFound`.
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn find_by_voice_channel(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
    ) -> StoreResult<Option<VoiceTextLink>>;

    async fn find_by_text_channel(
        &self,
        guild: &GuildId,
        text: &TextChannelId,
    ) -> StoreResult<Option<VoiceTextLink>>;

    /// Returns every persisted link, oldest first.
    async fn find_all(&self) -> StoreResult<Vec<VoiceTextLink>>;

    /// Upserts keyed by link id; an update only touches the text channel
    /// reference and `updated_at`.
    async fn save(&self, link: &VoiceTextLink) -> StoreResult<()>;

    async fn delete(&self, id: &LinkId) -> StoreResult<()>;
}

/// Volatile store backend keyed by link id.
#[derive(Debug, Default)]
pub struct InMemoryLinkStore {
    links: RwLock<HashMap<LinkId, VoiceTextLink>>,
}

impl InMemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for InMemoryLinkStore {
    async fn find_by_voice_channel(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
    ) -> StoreResult<Option<VoiceTextLink>> {
        let links = self.links.read().await;
        Ok(links
            .values()
            .find(|link| link.guild_id() == guild && link.voice_channel_id() == voice)
            .cloned())
    }

    async fn find_by_text_channel(
        &self,
        guild: &GuildId,
        text: &TextChannelId,
    ) -> StoreResult<Option<VoiceTextLink>> {
        let links = self.links.read().await;
        Ok(links
            .values()
            .find(|link| link.guild_id() == guild && link.text_channel_id() == text)
            .cloned())
    }

    async fn find_all(&self) -> StoreResult<Vec<VoiceTextLink>> {
        let links = self.links.read().await;
        let mut all: Vec<VoiceTextLink> = links.values().cloned().collect();
        all.sort_by_key(|link| (link.created_at(), link.id().clone()));
        Ok(all)
    }

    async fn save(&self, link: &VoiceTextLink) -> StoreResult<()> {
        let mut links = self.links.write().await;
        let conflicting = links.values().any(|existing| {
            existing.id() != link.id()
                && existing.guild_id() == link.guild_id()
                && existing.voice_channel_id() == link.voice_channel_id()
        });
        if conflicting {
            return Err(LinkStoreError::DuplicateLink {
                guild: link.guild_id().to_string(),
                voice: link.voice_channel_id().to_string(),
            });
        }
        links.insert(link.id().clone(), link.clone());
        Ok(())
    }

    async fn delete(&self, id: &LinkId) -> StoreResult<()> {
        let mut links = self.links.write().await;
        links
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| LinkStoreError::LinkNotFound(id.to_string()))
    }
}
