//! Access-list delta computation and application for one link.

use std::collections::HashSet;
use std::sync::Arc;

use tether_core::UserId;
use tether_store::VoiceTextLink;
use tracing::{error, info};

use crate::{DirectoryPort, EngineResult};

/// Converges one text channel's member access list onto the authoritative
/// set of users currently in its voice channel.
pub struct PermissionReconciler {
    directory: Arc<dyn DirectoryPort>,
}

impl PermissionReconciler {
    pub fn new(directory: Arc<dyn DirectoryPort>) -> Self {
        Self { directory }
    }

    /// Grants every voice occupant not yet permitted and revokes every
    /// permitted user no longer in the voice channel.
    ///
    /// A failed read of the current access list aborts reconciliation for
    /// this link; individual grant/revoke failures are logged and skipped so
    /// one user never blocks the rest. Convergence is retried by the next
    /// sweep.
    pub async fn reconcile(
        &self,
        link: &VoiceTextLink,
        voice_members: &[UserId],
    ) -> EngineResult<()> {
        let permitted = self
            .directory
            .get_text_channel_members(link.text_channel_id())
            .await?;
        let permitted_set: HashSet<&UserId> = permitted.iter().collect();
        let voice_set: HashSet<&UserId> = voice_members.iter().collect();

        info!(
            guild = %link.guild_id(),
            voice = %link.voice_channel_id(),
            text_members = permitted.len(),
            voice_members = voice_members.len(),
            "reconciling text channel access"
        );

        for user in voice_members {
            if permitted_set.contains(user) {
                continue;
            }
            if let Err(error) = self
                .directory
                .add_member_to_text_channel(link.guild_id(), link.text_channel_id(), user)
                .await
            {
                error!(
                    %error,
                    guild = %link.guild_id(),
                    text = %link.text_channel_id(),
                    user = %user,
                    "failed to grant text channel access"
                );
            }
        }

        for user in &permitted {
            if voice_set.contains(user) {
                continue;
            }
            if let Err(error) = self
                .directory
                .remove_member_from_text_channel(link.guild_id(), link.text_channel_id(), user)
                .await
            {
                error!(
                    %error,
                    guild = %link.guild_id(),
                    text = %link.text_channel_id(),
                    user = %user,
                    "failed to revoke text channel access"
                );
            }
        }

        Ok(())
    }
}
