//! The persisted binding between one voice channel and its companion text channel.

use chrono::{DateTime, Utc};
use tether_core::{GuildId, LinkId, TextChannelId, VoiceChannelId};
use uuid::Uuid;

use crate::{LinkStoreError, StoreResult};

/// One voice channel's binding to the text channel that mirrors its membership.
///
/// Guild and voice channel are immutable once set; the text channel reference
/// may be replaced when the remote channel was deleted externally, which also
/// refreshes `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTextLink {
    id: LinkId,
    guild_id: GuildId,
    voice_channel_id: VoiceChannelId,
    text_channel_id: TextChannelId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VoiceTextLink {
    /// Constructs a fresh link with a generated id and current timestamps.
    pub fn new(
        guild_id: GuildId,
        voice_channel_id: VoiceChannelId,
        text_channel_id: TextChannelId,
    ) -> StoreResult<Self> {
        if guild_id.is_empty() {
            return Err(LinkStoreError::EmptyGuildId);
        }
        if voice_channel_id.is_empty() {
            return Err(LinkStoreError::EmptyVoiceChannelId);
        }
        if text_channel_id.is_empty() {
            return Err(LinkStoreError::EmptyTextChannelId);
        }

        let now = Utc::now();
        Ok(Self {
            id: LinkId::new(Uuid::new_v4().to_string()),
            guild_id,
            voice_channel_id,
            text_channel_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reconstructs a link from persisted fields, revalidating every invariant.
    pub fn rebuild(
        id: LinkId,
        guild_id: GuildId,
        voice_channel_id: VoiceChannelId,
        text_channel_id: TextChannelId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Self> {
        if id.is_empty() {
            return Err(LinkStoreError::EmptyLinkId);
        }
        if guild_id.is_empty() {
            return Err(LinkStoreError::EmptyGuildId);
        }
        if voice_channel_id.is_empty() {
            return Err(LinkStoreError::EmptyVoiceChannelId);
        }
        if text_channel_id.is_empty() {
            return Err(LinkStoreError::EmptyTextChannelId);
        }

        Ok(Self {
            id,
            guild_id,
            voice_channel_id,
            text_channel_id,
            created_at,
            updated_at,
        })
    }

    pub fn id(&self) -> &LinkId {
        &self.id
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn voice_channel_id(&self) -> &VoiceChannelId {
        &self.voice_channel_id
    }

    pub fn text_channel_id(&self) -> &TextChannelId {
        &self.text_channel_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Rebinds the link to a replacement text channel, keeping the same id.
    pub fn change_text_channel(&mut self, text_channel_id: TextChannelId) -> StoreResult<()> {
        if text_channel_id.is_empty() {
            return Err(LinkStoreError::EmptyTextChannelId);
        }
        self.text_channel_id = text_channel_id;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::VoiceTextLink;
    use crate::LinkStoreError;
    use std::time::Duration;
    use tether_core::{GuildId, LinkId, TextChannelId, VoiceChannelId};

    fn sample() -> VoiceTextLink {
        VoiceTextLink::new(
            GuildId::new("g-1"),
            VoiceChannelId::new("v-1"),
            TextChannelId::new("t-1"),
        )
        .expect("valid link")
    }

    #[test]
    fn new_link_stamps_id_and_timestamps() {
        let link = sample();
        assert!(!link.id().is_empty());
        assert_eq!(link.created_at(), link.updated_at());
    }

    #[test]
    fn new_rejects_empty_identifiers() {
        let error = VoiceTextLink::new(
            GuildId::new(""),
            VoiceChannelId::new("v-1"),
            TextChannelId::new("t-1"),
        )
        .expect_err("empty guild");
        assert!(matches!(error, LinkStoreError::EmptyGuildId));

        let error = VoiceTextLink::new(
            GuildId::new("g-1"),
            VoiceChannelId::new(""),
            TextChannelId::new("t-1"),
        )
        .expect_err("empty voice channel");
        assert!(matches!(error, LinkStoreError::EmptyVoiceChannelId));

        let error = VoiceTextLink::new(
            GuildId::new("g-1"),
            VoiceChannelId::new("v-1"),
            TextChannelId::new(""),
        )
        .expect_err("empty text channel");
        assert!(matches!(error, LinkStoreError::EmptyTextChannelId));
    }

    #[test]
    fn rebuild_rejects_empty_link_id() {
        let link = sample();
        let error = VoiceTextLink::rebuild(
            LinkId::new(""),
            link.guild_id().clone(),
            link.voice_channel_id().clone(),
            link.text_channel_id().clone(),
            link.created_at(),
            link.updated_at(),
        )
        .expect_err("empty id");
        assert!(matches!(error, LinkStoreError::EmptyLinkId));
    }

    #[test]
    fn change_text_channel_keeps_id_and_refreshes_updated_at() {
        let mut link = sample();
        let original_id = link.id().clone();
        let created_at = link.created_at();

        std::thread::sleep(Duration::from_millis(5));
        link.change_text_channel(TextChannelId::new("t-2"))
            .expect("rebind");

        assert_eq!(link.id(), &original_id);
        assert_eq!(link.text_channel_id().as_str(), "t-2");
        assert_eq!(link.created_at(), created_at);
        assert!(link.updated_at() > link.created_at());
    }

    #[test]
    fn change_text_channel_rejects_empty_id() {
        let mut link = sample();
        let error = link
            .change_text_channel(TextChannelId::new(""))
            .expect_err("empty replacement");
        assert!(matches!(error, LinkStoreError::EmptyTextChannelId));
    }
}
