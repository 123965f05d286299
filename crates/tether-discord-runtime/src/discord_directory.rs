//! Serenity-backed implementation of the engine's directory port.
//!
//! Channel and permission mutations go through the HTTP API; membership and
//! guild enumeration read from the gateway cache, which the voice-state
//! intent keeps current.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    Cache, Channel, ChannelId, ChannelType, CreateChannel, GuildChannel, Http,
    PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId,
};
use serenity::http::HttpError;
use tether_core::{GuildId, TextChannelId, UserId, VoiceChannelId};
use tether_engine::{DirectoryError, DirectoryPort, DirectoryResult, GuildVoiceStates};

/// Discord JSON error code for "Unknown Channel".
const UNKNOWN_CHANNEL_CODE: isize = 10003;

/// Permissions granted to each voice occupant on the companion text channel.
const MEMBER_ALLOW: Permissions = Permissions::VIEW_CHANNEL
    .union(Permissions::SEND_MESSAGES)
    .union(Permissions::READ_MESSAGE_HISTORY);

/// Directory adapter over one bot session's HTTP client and gateway cache.
pub struct DiscordDirectory {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl DiscordDirectory {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    async fn fetch_guild_channel(&self, id: ChannelId) -> DirectoryResult<GuildChannel> {
        match self.http.get_channel(id).await.map_err(unavailable)? {
            Channel::Guild(channel) => Ok(channel),
            other => Err(DirectoryError::Unavailable(format!(
                "channel '{}' is not a guild channel",
                other.id()
            ))),
        }
    }

    async fn channel_exists(&self, id: ChannelId) -> DirectoryResult<bool> {
        match self.http.get_channel(id).await {
            Ok(_) => Ok(true),
            Err(error) if is_unknown_channel(&error) => Ok(false),
            Err(error) => Err(unavailable(error)),
        }
    }
}

fn unavailable(error: serenity::Error) -> DirectoryError {
    DirectoryError::Unavailable(error.to_string())
}

fn is_unknown_channel(error: &serenity::Error) -> bool {
    matches!(
        error,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.error.code == UNKNOWN_CHANNEL_CODE
    )
}

fn parse_snowflake(value: &str, what: &'static str) -> DirectoryResult<u64> {
    match value.parse::<u64>() {
        Ok(id) if id != 0 => Ok(id),
        _ => Err(DirectoryError::MalformedId(format!("{what} '{value}'"))),
    }
}

fn channel_id(value: &str) -> DirectoryResult<ChannelId> {
    Ok(ChannelId::new(parse_snowflake(value, "channel id")?))
}

fn guild_id(value: &str) -> DirectoryResult<serenity::all::GuildId> {
    Ok(serenity::all::GuildId::new(parse_snowflake(
        value, "guild id",
    )?))
}

fn user_id(value: &str) -> DirectoryResult<serenity::all::UserId> {
    Ok(serenity::all::UserId::new(parse_snowflake(
        value, "user id",
    )?))
}

#[async_trait]
impl DirectoryPort for DiscordDirectory {
    async fn create_text_channel_for_voice(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
    ) -> DirectoryResult<TextChannelId> {
        let guild = guild_id(guild.as_str())?;
        let voice_channel = self.fetch_guild_channel(channel_id(voice.as_str())?).await?;

        // The @everyone role shares the guild's id; hiding the channel from
        // it keeps the companion channel private to granted members.
        let everyone = RoleId::new(guild.get());
        let hidden = PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL,
            kind: PermissionOverwriteType::Role(everyone),
        };

        let mut builder = CreateChannel::new(format!("txt-{}", voice_channel.name))
            .kind(ChannelType::Text)
            .permissions(vec![hidden]);
        if let Some(parent) = voice_channel.parent_id {
            builder = builder.category(parent);
        }

        let created = guild
            .create_channel(&self.http, builder)
            .await
            .map_err(unavailable)?;
        Ok(TextChannelId::new(created.id.to_string()))
    }

    async fn delete_text_channel(&self, text: &TextChannelId) -> DirectoryResult<()> {
        channel_id(text.as_str())?
            .delete(&self.http)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn is_voice_channel_exists(&self, voice: &VoiceChannelId) -> DirectoryResult<bool> {
        self.channel_exists(channel_id(voice.as_str())?).await
    }

    async fn is_text_channel_exists(&self, text: &TextChannelId) -> DirectoryResult<bool> {
        self.channel_exists(channel_id(text.as_str())?).await
    }

    async fn add_member_to_text_channel(
        &self,
        _guild: &GuildId,
        text: &TextChannelId,
        user: &UserId,
    ) -> DirectoryResult<()> {
        let overwrite = PermissionOverwrite {
            allow: MEMBER_ALLOW,
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Member(user_id(user.as_str())?),
        };
        channel_id(text.as_str())?
            .create_permission(&self.http, overwrite)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn remove_member_from_text_channel(
        &self,
        _guild: &GuildId,
        text: &TextChannelId,
        user: &UserId,
    ) -> DirectoryResult<()> {
        channel_id(text.as_str())?
            .delete_permission(
                &self.http,
                PermissionOverwriteType::Member(user_id(user.as_str())?),
            )
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get_voice_channel_member_count(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
    ) -> DirectoryResult<usize> {
        let guild = guild_id(guild.as_str())?;
        let voice = channel_id(voice.as_str())?;
        let cached = self
            .cache
            .guild(guild)
            .ok_or_else(|| DirectoryError::Unavailable(format!("guild '{guild}' not cached")))?;
        Ok(cached
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(voice))
            .count())
    }

    async fn get_guilds(&self) -> DirectoryResult<Vec<GuildId>> {
        Ok(self
            .cache
            .guilds()
            .into_iter()
            .map(|guild| GuildId::new(guild.to_string()))
            .collect())
    }

    async fn get_guild_voice_states(&self, guild: &GuildId) -> DirectoryResult<GuildVoiceStates> {
        let guild = guild_id(guild.as_str())?;
        let cached = self
            .cache
            .guild(guild)
            .ok_or_else(|| DirectoryError::Unavailable(format!("guild '{guild}' not cached")))?;

        let mut states: GuildVoiceStates = HashMap::new();
        for (user, state) in &cached.voice_states {
            if let Some(channel) = state.channel_id {
                states
                    .entry(VoiceChannelId::new(channel.to_string()))
                    .or_default()
                    .push(UserId::new(user.to_string()));
            }
        }
        Ok(states)
    }

    async fn get_text_channel_members(
        &self,
        text: &TextChannelId,
    ) -> DirectoryResult<Vec<UserId>> {
        let channel = self.fetch_guild_channel(channel_id(text.as_str())?).await?;
        Ok(channel
            .permission_overwrites
            .iter()
            .filter(|overwrite| overwrite.allow.contains(Permissions::VIEW_CHANNEL))
            .filter_map(|overwrite| match overwrite.kind {
                PermissionOverwriteType::Member(user) => Some(UserId::new(user.to_string())),
                _ => None,
            })
            .collect())
    }
}
