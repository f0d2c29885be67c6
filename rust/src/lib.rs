mod actions;
mod core;
mod error;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};
use parley_transport_traits::{ConversationKey, MessagingTransport, ProfileResolver};

pub use actions::AppAction;
pub use error::{QueueError, SyncError};
pub use logging::init_logging;
pub use parley_transport_traits as transport;
pub use state::*;
pub use updates::*;

/// Return the default `parley_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Handle to the sync engine.
///
/// Owns the sending side of the actor mailbox. Every method returns
/// immediately; effects show up in [`SyncApp::state`] and on the update
/// stream once the actor has processed them.
pub struct SyncApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl SyncApp {
    pub fn new(
        data_dir: String,
        transport: Arc<dyn MessagingTransport>,
        profiles: Arc<dyn ProfileResolver>,
    ) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "SyncApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                transport,
                profiles,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Make `key` the active conversation, tearing down the previous one.
    pub fn open_conversation(&self, key: ConversationKey) {
        self.dispatch(AppAction::OpenConversation { key });
    }

    pub fn close_conversation(&self) {
        self.dispatch(AppAction::CloseConversation);
    }

    /// Queue `content` for `key` and publish it in the background.
    ///
    /// Returns the id of the queued message, or `None` when the content is
    /// blank. The actor may still refuse the send (for example while the
    /// transport is unavailable); that outcome is reported through state.
    pub fn send(&self, key: ConversationKey, content: impl Into<String>) -> Option<String> {
        let content = content.into();
        if content.trim().is_empty() {
            return None;
        }
        let message_id = uuid::Uuid::new_v4().to_string();
        self.dispatch(AppAction::SendMessage {
            key,
            message_id: message_id.clone(),
            content,
        });
        Some(message_id)
    }

    pub fn retry(&self, key: ConversationKey, message_id: impl Into<String>) {
        self.dispatch(AppAction::RetryMessage {
            key,
            message_id: message_id.into(),
        });
    }

    pub fn cancel(&self, key: ConversationKey, message_id: impl Into<String>) {
        self.dispatch(AppAction::CancelMessage {
            key,
            message_id: message_id.into(),
        });
    }

    pub fn request_older_page(&self, key: ConversationKey) {
        self.dispatch(AppAction::LoadOlderMessages { key });
    }

    pub fn reconnect(&self) {
        self.dispatch(AppAction::Reconnect);
    }

    pub fn logout(&self) {
        self.dispatch(AppAction::Logout);
    }

    /// Rendered list for `key` as of the latest snapshot. Conversations that
    /// are not open only show their queued messages.
    pub fn rendered_messages(&self, key: &ConversationKey) -> Vec<ChatMessage> {
        let state = self.state();
        match state.current_conversation {
            Some(view) if view.key == *key => view.messages,
            _ => state.outbox.get(key).cloned().unwrap_or_default(),
        }
    }

    /// Whether older history may exist for `key`. Conversations that are not
    /// open start over from the most recent page, so they report `true`.
    pub fn has_more(&self, key: &ConversationKey) -> bool {
        match self.state().current_conversation {
            Some(view) if view.key == *key => view.has_more,
            _ => true,
        }
    }
}
