//! Reconciliation engine keeping companion text channels consistent with
//! voice channel membership.
//!
//! Three components cooperate over the persistence and directory ports:
//! the lifecycle service handles live membership events under per-channel
//! locks, the permission reconciler applies access-list deltas for one link,
//! and the sweep replays lifecycle-equivalent logic across every guild to
//! converge persisted state with live remote state.

use tether_core::{GuildId, UserId, VoiceChannelId};
use tether_store::LinkStoreError;
use thiserror::Error;

mod directory_port;
mod link_lifecycle;
mod link_sweep;
mod permission_reconciler;

pub use directory_port::{DirectoryError, DirectoryPort, DirectoryResult, GuildVoiceStates};
pub use link_lifecycle::{CleanupOutcome, LinkLifecycle};
pub use link_sweep::{LinkSweep, SweepReport};
pub use permission_reconciler::PermissionReconciler;


/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by lifecycle and sweep operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] LinkStoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// One user's movement between voice channels, as reported by the gateway.
///
/// Absent sides carry `None`: a plain join has no `before`, a plain leave has
/// no `after`, and a channel switch carries both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStateUpdate {
    pub guild_id: GuildId,
    pub before: Option<VoiceChannelId>,
    pub after: Option<VoiceChannelId>,
    pub user_id: UserId,
}
