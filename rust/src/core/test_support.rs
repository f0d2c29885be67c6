// Drives an AppCore synchronously on the test thread.

use std::time::{Duration, Instant};

use parley_memory_transport::MemoryTransport;
use tempfile::TempDir;

use super::*;

pub(super) struct Harness {
    pub(super) core: AppCore,
    pub(super) network: MemoryTransport,
    pub(super) updates: flume::Receiver<AppUpdate>,
    rx: flume::Receiver<CoreMsg>,
    _dir: TempDir,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with_config(serde_json::json!({}))
    }

    pub(super) fn with_config(config: serde_json::Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("parley_config.json"),
            serde_json::to_vec(&config).unwrap(),
        )
        .unwrap();
        let network = MemoryTransport::new().with_local_address("0xme");
        let (update_tx, updates) = flume::unbounded();
        let (core_tx, rx) = flume::unbounded();
        let core = AppCore::new(
            update_tx,
            core_tx,
            dir.path().to_string_lossy().into_owned(),
            Arc::new(RwLock::new(AppState::empty())),
            Arc::new(network.clone()),
            Arc::new(network.clone()),
        );
        Self {
            core,
            network,
            updates,
            rx,
            _dir: dir,
        }
    }

    pub(super) fn act(&mut self, action: AppAction) {
        self.core.handle_message(CoreMsg::Action(action));
    }

    /// Feed queued internal events to the core until `done` holds.
    pub(super) fn pump_until(&mut self, what: &str, done: impl Fn(&AppCore) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done(&self.core) {
                return;
            }
            if let Ok(msg) = self.rx.recv_timeout(Duration::from_millis(20)) {
                self.core.handle_message(msg);
            }
        }
        panic!("{what}: condition not met within 5s");
    }

    /// Handle everything already queued without waiting.
    pub(super) fn drain(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            self.core.handle_message(msg);
        }
    }

    pub(super) fn queue_ids(&self, key: &ConversationKey) -> Vec<String> {
        self.core
            .queue
            .entries(key)
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }
}
