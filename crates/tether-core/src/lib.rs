//! Shared identifier types for the Tether workspace.
//!
//! Platform identifiers are opaque strings on the wire; the newtypes here keep
//! guild, channel, and user ids from being mixed up across crate boundaries.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_string!(
    /// Snowflake of a guild (server).
    GuildId
);
id_string!(
    /// Snowflake of a voice channel.
    VoiceChannelId
);
id_string!(
    /// Snowflake of a text channel.
    TextChannelId
);
id_string!(
    /// Snowflake of a user.
    UserId
);
id_string!(
    /// Opaque primary key of a persisted voice/text link record.
    LinkId
);

/// Name of a serializing lock covering all link operations on one voice channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Builds the lock name for a (guild, voice channel) pair.
    pub fn for_channel(guild: &GuildId, voice: &VoiceChannelId) -> Self {
        Self(format!("{guild}:{voice}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
