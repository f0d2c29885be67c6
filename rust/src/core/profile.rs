// Peer profile lookup for the conversation header.

use crate::state::format_address;

use super::*;

/// Header title: the peer's best name (or shortened address) and the app name.
pub(crate) fn conversation_title(
    peer_address: Option<&str>,
    profile: Option<&Profile>,
    app_name: &str,
) -> String {
    let name = profile
        .and_then(Profile::best_name)
        .or_else(|| peer_address.map(format_address))
        .unwrap_or_else(|| "Conversation".to_string());
    format!("{name} • {app_name}")
}

impl AppCore {
    pub(super) fn resolve_peer_profile(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let Some(address) = active.key.peer_address() else {
            return;
        };
        let key = active.key.clone();
        let epoch = active.epoch;
        let resolver = self.profiles.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let profile = resolver.resolve_profile(&address).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ProfileResolved {
                key,
                epoch,
                profile,
            })));
        });
    }

    pub(super) fn handle_profile_resolved(
        &mut self,
        key: ConversationKey,
        epoch: u64,
        profile: Option<Profile>,
    ) {
        let Some(active) = self.active.as_mut().filter(|a| a.is(&key, epoch)) else {
            tracing::debug!(%key, epoch, "dropping stale profile");
            return;
        };
        if active.peer_profile == profile {
            return;
        }
        active.peer_profile = profile;
        // Sender names are baked into the rendered list.
        active.render_cache = None;
        self.refresh_views();
    }
}
