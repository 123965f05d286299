//! Discord gateway runtime for Tether.
//!
//! Hosts the serenity-backed directory adapter, the gateway event router, and
//! the client entrypoint that ties the engine to a live bot session.

mod discord_directory;
mod discord_events;
mod discord_runtime;

pub use discord_directory::DiscordDirectory;
pub use discord_events::EventRouter;
pub use discord_runtime::{run_discord_runtime, DiscordRuntimeConfig};
