mod config;
mod confirmed;
mod cursor;
mod history;
mod live;
mod profile;
mod queue;
mod reconcile;
mod send;
#[cfg(test)]
mod test_support;
mod view;

pub(crate) use config::default_app_config_json;

use std::sync::{Arc, RwLock};

use flume::Sender;
use parley_transport_traits::{
    ConversationKey, MessagingTransport, PageQuery, Profile, ProfileResolver,
};

use crate::actions::AppAction;
use crate::error::SyncError;
use crate::state::AppState;
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use confirmed::ConfirmedSet;
use cursor::PaginationCursorTracker;
use history::HistoryFetcher;
use live::LiveIngestor;
use queue::MessageQueueStore;

struct ActiveConversation {
    key: ConversationKey,
    // Activation epoch. Async results tagged with another epoch are stale.
    epoch: u64,
    confirmed: ConfirmedSet,
    fetch_in_flight: Option<PageQuery>,
    fetch_error: Option<String>,
    stream_interrupted: bool,
    peer_profile: Option<Profile>,
    render_cache: Option<view::RenderCache>,
}

impl ActiveConversation {
    fn new(key: ConversationKey, epoch: u64) -> Self {
        Self {
            key,
            epoch,
            confirmed: ConfirmedSet::default(),
            fetch_in_flight: None,
            fetch_error: None,
            stream_interrupted: false,
            peer_profile: None,
            render_cache: None,
        }
    }

    fn is(&self, key: &ConversationKey, epoch: u64) -> bool {
        self.key == *key && self.epoch == epoch
    }
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,
    last_outgoing_ts: i64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    transport: Arc<dyn MessagingTransport>,
    profiles: Arc<dyn ProfileResolver>,

    // Sync components. All owned by the actor thread.
    queue: MessageQueueStore,
    cursors: PaginationCursorTracker,
    history: HistoryFetcher,
    live: LiveIngestor,

    active: Option<ActiveConversation>,
    next_epoch: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        transport: Arc<dyn MessagingTransport>,
        profiles: Arc<dyn ProfileResolver>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let mut state = AppState::empty();
        state.transport_unavailable = !transport.is_authorized();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .expect("tokio runtime");

        tracing::info!(
            data_dir = %data_dir,
            page_size = config.page_size(),
            pending_timeout_secs = config.pending_timeout().as_secs(),
            "AppCore config loaded"
        );

        let history = HistoryFetcher::new(transport.clone(), config.page_size());
        let this = Self {
            state,
            rev: 0,
            last_outgoing_ts: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            transport,
            profiles,
            queue: MessageQueueStore::default(),
            cursors: PaginationCursorTracker::default(),
            history,
            live: LiveIngestor::default(),
            active: None,
            next_epoch: 0,
        };

        this.start_pending_sweep();

        // Ensure SyncApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_message_failed(&mut self, key: ConversationKey, message_id: String, reason: String) {
        let rev = self.next_rev();
        // Keep snapshot rev in sync with the update stream even though this is a side-effect update.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::MessageFailed {
            rev,
            key,
            message_id,
            reason,
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Stays in state until the UI clears it.
        self.state.toast = Some(msg.into());
        self.refresh_views();
    }

    /// Re-read the transport readiness flag into state. Returns whether the
    /// transport is authorized.
    fn refresh_transport_status(&mut self) -> bool {
        let authorized = self.transport.is_authorized();
        if self.state.transport_unavailable == authorized {
            tracing::info!(authorized, "transport readiness changed");
        }
        self.state.transport_unavailable = !authorized;
        authorized
    }

    fn active_key(&self) -> Option<&ConversationKey> {
        self.active.as_ref().map(|a| &a.key)
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries message content.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::PageFetched {
                key,
                epoch,
                query,
                result,
            } => self.handle_page_fetched(key, epoch, query, result),
            InternalEvent::SendCompleted {
                key,
                message_id,
                attempt,
                result,
            } => self.handle_send_completed(key, message_id, attempt, result),
            InternalEvent::ProfileResolved {
                key,
                epoch,
                profile,
            } => self.handle_profile_resolved(key, epoch, profile),
            InternalEvent::StreamDelivered { key, token, event } => {
                self.handle_stream_delivered(key, token, event)
            }
            InternalEvent::PendingSweep => self.sweep_pending(),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Conversation lifecycle
            AppAction::OpenConversation { key } => self.open_conversation(key),
            AppAction::CloseConversation => {
                self.deactivate();
                self.refresh_views();
            }

            // Outgoing
            AppAction::SendMessage {
                key,
                message_id,
                content,
            } => self.send_message(key, message_id, content),
            AppAction::RetryMessage { key, message_id } => self.retry_message(&key, &message_id),
            AppAction::CancelMessage { key, message_id } => {
                self.cancel_message(&key, &message_id)
            }

            // History
            AppAction::LoadOlderMessages { key } => self.request_older_page(&key),

            // Transport
            AppAction::Reconnect => self.reconnect(),
            AppAction::Logout => self.logout(),

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }

    fn open_conversation(&mut self, key: ConversationKey) {
        if self.active_key() == Some(&key) {
            tracing::debug!(%key, "conversation already open");
            self.refresh_transport_status();
            self.refresh_views();
            return;
        }

        // Teardown-then-attach: nothing from the previous conversation may
        // land after this point.
        self.deactivate();
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        // Re-entry is a fresh start.
        self.cursors.reset(&key);
        self.active = Some(ActiveConversation::new(key.clone(), epoch));
        tracing::info!(%key, epoch, "conversation opened");

        if self.refresh_transport_status() {
            self.attach_stream();
            self.start_fetch(None);
        } else {
            tracing::warn!(%key, "transport unavailable; conversation opened read-only");
        }
        self.resolve_peer_profile();
        self.refresh_views();
    }

    fn deactivate(&mut self) {
        if self.live.teardown() {
            tracing::debug!("live subscription torn down");
        }
        if let Some(prev) = self.active.take() {
            tracing::info!(key = %prev.key, epoch = prev.epoch, "conversation closed");
        }
    }

    fn reconnect(&mut self) {
        if !self.refresh_transport_status() {
            self.toast(SyncError::TransportUnavailable.user_visible_message());
            return;
        }
        let Some(active) = self.active.as_ref() else {
            self.refresh_views();
            return;
        };
        let needs_stream = !self.live.is_attached_to(&active.key);
        let needs_fetch = active.confirmed.is_empty() && active.fetch_in_flight.is_none();
        if needs_stream {
            self.attach_stream();
        }
        if needs_fetch {
            self.start_fetch(None);
        }
        self.refresh_views();
    }

    fn logout(&mut self) {
        self.deactivate();
        self.queue.clear();
        self.cursors.clear();
        self.state.toast = None;
        self.refresh_transport_status();
        tracing::info!("session state cleared");
        self.refresh_views();
    }

    /// Remove queued entries whose confirmed counterpart has arrived.
    fn prune_confirmed_from_queue(&mut self) -> usize {
        let Some(active) = self.active.as_ref() else {
            return 0;
        };
        let ids = reconcile::confirmed_queue_ids(self.queue.entries(&active.key), &active.confirmed);
        for id in &ids {
            self.queue.remove(&active.key, id);
            tracing::debug!(key = %active.key, message_id = %id, "queued message confirmed");
        }
        ids.len()
    }
}
