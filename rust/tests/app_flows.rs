use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use parley_core::transport::{ConfirmedMessage, ConversationKey, MissingProfileResolver, Profile};
use parley_core::{AppReconciler, AppUpdate, MessageDeliveryState, SyncApp, SyncError};
use parley_memory_transport::MemoryTransport;
use tempfile::tempdir;

fn write_config(data_dir: &str, config: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("parley_config.json");
    std::fs::write(path, serde_json::to_vec(&config).unwrap()).unwrap();
}

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

const ME: &str = "0x00000000000000000000000000000000000000aa";
const PEER: &str = "0x1234567890abcdef1234567890abcdef12345678";

fn peer_key() -> ConversationKey {
    ConversationKey::from_parts(PEER, "lens.dev/dm/1")
}

fn other_key() -> ConversationKey {
    ConversationKey::from_parts("0xfeedfacefeedfacefeedfacefeedfacefeedface", "lens.dev/dm/2")
}

fn peer_msg(id: &str, sent_at: i64) -> ConfirmedMessage {
    ConfirmedMessage {
        id: id.into(),
        sender: PEER.into(),
        content: format!("message {id}"),
        sent_at,
    }
}

fn history(prefix: &str, count: i64) -> Vec<ConfirmedMessage> {
    (1..=count)
        .map(|i| peer_msg(&format!("{prefix}{i}"), 1_000 * i))
        .collect()
}

struct Fixture {
    app: Arc<SyncApp>,
    network: MemoryTransport,
    _dir: tempfile::TempDir,
}

fn fixture_with(config: serde_json::Value, network: MemoryTransport) -> Fixture {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap().to_string();
    write_config(&data_dir, config);
    let app = SyncApp::new(data_dir, Arc::new(network.clone()), Arc::new(network.clone()));
    Fixture {
        app,
        network,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(
        serde_json::json!({}),
        MemoryTransport::new().with_local_address(ME),
    )
}

impl Fixture {
    fn ids(&self, key: &ConversationKey) -> Vec<String> {
        self.app
            .rendered_messages(key)
            .into_iter()
            .map(|m| m.id)
            .collect()
    }

    fn open_and_wait(&self, key: &ConversationKey) {
        self.app.open_conversation(key.clone());
        let app = self.app.clone();
        let key = key.clone();
        wait_until("conversation loaded", Duration::from_secs(5), move || {
            app.state()
                .current_conversation
                .is_some_and(|c| c.key == key && !c.loading)
        });
    }
}

#[test]
fn unopened_conversation_renders_nothing_and_has_more() {
    let f = fixture();
    assert!(f.app.rendered_messages(&peer_key()).is_empty());
    assert!(f.app.has_more(&peer_key()));
}

#[test]
fn opening_fetches_the_most_recent_page() {
    let f = fixture();
    f.network.seed_history(&peer_key(), history("h", 45));

    f.open_and_wait(&peer_key());

    let view = f.app.state().current_conversation.unwrap();
    assert_eq!(view.messages.len(), 20);
    assert_eq!(view.messages[0].id, "h45");
    assert_eq!(view.messages[19].id, "h26");
    assert!(view.has_more);
    assert!(view.composer_enabled);
    assert_eq!(f.network.subscriber_count(&peer_key()), 1);
    assert_eq!(f.network.fetch_log()[0].1.end_time, None);
}

#[test]
fn send_then_live_confirmation_collapses_to_one_entry() {
    let f = fixture();
    f.network.set_echo_sends(false);
    f.open_and_wait(&peer_key());

    let id = f.app.send(peer_key(), "hi").unwrap();
    {
        let app = f.app.clone();
        let id = id.clone();
        wait_until("pending rendered", Duration::from_secs(5), move || {
            app.rendered_messages(&peer_key())
                .iter()
                .any(|m| m.id == id && m.delivery.is_queued())
        });
    }
    assert_eq!(f.ids(&peer_key()), vec![id.clone()]);

    f.network.deliver(
        &peer_key(),
        ConfirmedMessage {
            id: id.clone(),
            sender: ME.into(),
            content: "hi".into(),
            sent_at: 5,
        },
    );

    let app = f.app.clone();
    wait_until("confirmed", Duration::from_secs(5), move || {
        let msgs = app.rendered_messages(&peer_key());
        msgs.len() == 1 && msgs[0].delivery == MessageDeliveryState::Confirmed
    });
    assert!(f.app.state().outbox.is_empty());
}

#[test]
fn older_page_uses_oldest_loaded_timestamp_and_dedups() {
    let f = fixture();
    f.network.seed_history(&peer_key(), history("h", 45));
    f.open_and_wait(&peer_key());

    // Duplicate of an entry already loaded from the first page.
    f.network.deliver(&peer_key(), peer_msg("h44", 44_000));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(f.app.rendered_messages(&peer_key()).len(), 20);

    f.app.request_older_page(peer_key());
    let app = f.app.clone();
    wait_until("second page", Duration::from_secs(5), move || {
        app.rendered_messages(&peer_key()).len() >= 40
    });

    let log = f.network.fetch_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].1.end_time, Some(26_000));

    let ids = f.ids(&peer_key());
    let unique: std::collections::HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
    assert_eq!(ids.len(), 40);
    assert_eq!(ids.last().map(String::as_str), Some("h6"));
    assert!(f.app.has_more(&peer_key()));
}

#[test]
fn paging_stops_when_history_is_exhausted() {
    let f = fixture();
    f.network.seed_history(&peer_key(), history("h", 25));
    f.open_and_wait(&peer_key());

    f.app.request_older_page(peer_key());
    let app = f.app.clone();
    wait_until("exhausted", Duration::from_secs(5), move || {
        !app.has_more(&peer_key())
    });
    assert_eq!(f.app.rendered_messages(&peer_key()).len(), 25);

    f.app.request_older_page(peer_key());
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(f.network.fetch_log().len(), 2);
}

#[test]
fn failed_older_page_keeps_messages_and_retries_same_bound() {
    let f = fixture();
    f.network.seed_history(&peer_key(), history("h", 45));
    f.open_and_wait(&peer_key());

    f.network.fail_next_fetches(1);
    f.app.request_older_page(peer_key());
    let app = f.app.clone();
    wait_until("fetch error", Duration::from_secs(5), move || {
        app.state()
            .current_conversation
            .is_some_and(|c| c.fetch_error.is_some() && !c.loading)
    });

    let view = f.app.state().current_conversation.unwrap();
    assert_eq!(view.messages.len(), 20);
    assert!(view.has_more);
    assert!(view.can_load_older);

    f.app.request_older_page(peer_key());
    let app = f.app.clone();
    wait_until("older page after retry", Duration::from_secs(5), move || {
        app.rendered_messages(&peer_key()).len() == 40
    });

    let log = f.network.fetch_log();
    assert_eq!(log.len(), 3);
    assert_eq!(log[1].1.end_time, Some(26_000));
    assert_eq!(log[2].1.end_time, log[1].1.end_time);
    let view = f.app.state().current_conversation.unwrap();
    assert_eq!(view.fetch_error, None);
}

#[test]
fn cancelling_a_failed_message_removes_it_permanently() {
    let f = fixture();
    f.open_and_wait(&peer_key());
    f.network.fail_next_sends(1);

    let id = f.app.send(peer_key(), "doomed").unwrap();
    {
        let app = f.app.clone();
        let id = id.clone();
        wait_until("failed", Duration::from_secs(5), move || {
            app.rendered_messages(&peer_key()).iter().any(|m| {
                m.id == id && matches!(m.delivery, MessageDeliveryState::Failed { .. })
            })
        });
    }

    f.app.cancel(peer_key(), id.clone());
    f.app.open_conversation(other_key());
    f.open_and_wait(&peer_key());
    assert!(!f.ids(&peer_key()).contains(&id));
    assert!(f.network.sent_messages().is_empty());
}

#[test]
fn retry_after_failure_delivers() {
    let f = fixture();
    f.open_and_wait(&peer_key());
    f.network.fail_next_sends(1);

    let id = f.app.send(peer_key(), "second time lucky").unwrap();
    {
        let app = f.app.clone();
        let id = id.clone();
        wait_until("failed", Duration::from_secs(5), move || {
            app.rendered_messages(&peer_key()).iter().any(|m| {
                m.id == id && matches!(m.delivery, MessageDeliveryState::Failed { .. })
            })
        });
    }

    f.app.retry(peer_key(), id.clone());
    let app = f.app.clone();
    let want = id.clone();
    wait_until("confirmed after retry", Duration::from_secs(5), move || {
        app.rendered_messages(&peer_key())
            .iter()
            .any(|m| m.id == want && m.delivery == MessageDeliveryState::Confirmed)
    });
    assert_eq!(f.network.sent_messages().len(), 1);
    assert_eq!(f.network.sent_messages()[0].1.local_id, id);
}

#[test]
fn stale_page_after_switching_is_dropped() {
    let f = fixture();
    f.network.seed_history(&peer_key(), history("a", 5));
    f.network.seed_history(&other_key(), history("b", 3));
    f.network.set_fetch_delay(Some(Duration::from_millis(150)));

    f.app.open_conversation(peer_key());
    f.app.open_conversation(other_key());

    let app = f.app.clone();
    wait_until("second conversation loaded", Duration::from_secs(5), move || {
        app.rendered_messages(&other_key()).len() == 3
    });
    // Give the first fetch time to land.
    std::thread::sleep(Duration::from_millis(300));

    let ids = f.ids(&other_key());
    assert!(ids.iter().all(|id| id.starts_with('b')));
    assert_eq!(f.network.fetch_log().len(), 2);
    assert_eq!(f.network.subscriber_count(&peer_key()), 0);
}

#[test]
fn deliveries_on_a_torn_down_subscription_are_dropped() {
    let f = fixture();
    f.open_and_wait(&peer_key());
    f.open_and_wait(&other_key());

    assert_eq!(f.network.replay_to_retired(&peer_key(), peer_msg("ghost", 9_999)), 1);
    f.network.deliver(&other_key(), peer_msg("real", 10_000));

    let app = f.app.clone();
    wait_until("live delivery", Duration::from_secs(5), move || {
        app.rendered_messages(&other_key()).len() == 1
    });
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(f.ids(&other_key()), vec!["real".to_string()]);
}

#[test]
fn staleness_sweep_fails_unconfirmed_messages() {
    let f = fixture_with(
        serde_json::json!({"pending_timeout_secs": 1, "sweep_interval_ms": 50}),
        MemoryTransport::new().with_local_address(ME),
    );
    f.network.set_echo_sends(false);
    f.open_and_wait(&peer_key());

    let (reconciler, updates) = TestReconciler::new();
    f.app.listen_for_updates(Box::new(reconciler));

    let id = f.app.send(peer_key(), "into the void").unwrap();
    let app = f.app.clone();
    let want = id.clone();
    wait_until("promoted to failed", Duration::from_secs(5), move || {
        app.rendered_messages(&peer_key()).iter().any(|m| {
            m.id == want
                && m.delivery
                    == MessageDeliveryState::Failed {
                        reason: "not confirmed by the network".into(),
                    }
        })
    });

    let updates = updates.lock().unwrap();
    assert!(updates.iter().any(|u| matches!(
        u,
        AppUpdate::MessageFailed { message_id, .. } if *message_id == id
    )));
    assert!(updates.windows(2).all(|w| w[0].rev() < w[1].rev()));
}

#[test]
fn unavailable_transport_blocks_sending_and_paging() {
    let network = MemoryTransport::new().with_local_address(ME);
    network.set_authorized(false);
    network.seed_history(&peer_key(), history("h", 30));
    let f = fixture_with(serde_json::json!({}), network);

    f.app.open_conversation(peer_key());
    let app = f.app.clone();
    wait_until("read-only view", Duration::from_secs(5), move || {
        app.state()
            .current_conversation
            .is_some_and(|c| !c.composer_enabled)
    });
    assert!(f.app.state().transport_unavailable);
    assert!(f.app.has_more(&peer_key()));

    assert!(f.app.send(peer_key(), "hello?").is_some());
    f.app.request_older_page(peer_key());
    let app = f.app.clone();
    wait_until("toast", Duration::from_secs(5), move || {
        app.state().toast.as_deref()
            == Some(SyncError::TransportUnavailable.user_visible_message())
    });
    assert!(f.network.fetch_log().is_empty());
    assert!(f.network.sent_messages().is_empty());
    assert!(f.app.rendered_messages(&peer_key()).is_empty());

    f.network.set_authorized(true);
    f.app.reconnect();
    let app = f.app.clone();
    wait_until("loaded after reconnect", Duration::from_secs(5), move || {
        app.rendered_messages(&peer_key()).len() == 20
    });
    assert!(!f.app.state().transport_unavailable);
    assert_eq!(f.network.subscriber_count(&peer_key()), 1);
}

#[test]
fn interrupted_stream_keeps_messages_and_reconnects() {
    let f = fixture();
    f.network.seed_history(&peer_key(), history("h", 3));
    f.open_and_wait(&peer_key());

    f.network.interrupt(&peer_key(), "relay closed the connection");
    let app = f.app.clone();
    wait_until("interrupted", Duration::from_secs(5), move || {
        app.state()
            .current_conversation
            .is_some_and(|c| c.stream_interrupted)
    });
    assert_eq!(f.app.rendered_messages(&peer_key()).len(), 3);

    f.app.reconnect();
    let app = f.app.clone();
    wait_until("reattached", Duration::from_secs(5), move || {
        app.state()
            .current_conversation
            .is_some_and(|c| !c.stream_interrupted)
    });
    assert_eq!(f.network.subscriber_count(&peer_key()), 1);
    assert_eq!(f.network.fetch_log().len(), 1);
}

#[test]
fn header_uses_profile_and_configured_app_name() {
    let network = MemoryTransport::new().with_local_address(ME);
    network.insert_profile(Profile {
        address: PEER.into(),
        handle: Some("alice.lens".into()),
        display_name: Some("Alice".into()),
        avatar_url: None,
    });
    let f = fixture_with(serde_json::json!({"app_name": "Lenster"}), network);
    f.network.seed_history(&peer_key(), history("h", 1));

    f.app.open_conversation(peer_key());
    let app = f.app.clone();
    wait_until("title", Duration::from_secs(5), move || {
        app.state()
            .current_conversation
            .is_some_and(|c| c.title == "Alice • Lenster" && !c.messages.is_empty())
    });
    let view = f.app.state().current_conversation.unwrap();
    assert_eq!(view.messages[0].sender_name.as_deref(), Some("Alice"));
    assert!(!view.messages[0].is_mine);
}

#[test]
fn header_falls_back_to_short_address() {
    let dir = tempdir().unwrap();
    let network = MemoryTransport::new().with_local_address(ME);
    let f = Fixture {
        app: SyncApp::new(
            dir.path().to_str().unwrap().to_string(),
            Arc::new(network.clone()),
            Arc::new(MissingProfileResolver),
        ),
        network,
        _dir: dir,
    };
    f.open_and_wait(&peer_key());
    let view = f.app.state().current_conversation.unwrap();
    assert_eq!(view.peer_profile, None);
    assert_eq!(view.title, "0x1234…5678 • Parley");
    assert_eq!(view.peer_address.as_deref(), Some(PEER));
}

#[test]
fn logout_clears_queues() {
    let f = fixture();
    f.network.set_echo_sends(false);
    f.network.set_send_delay(Some(Duration::from_secs(30)));
    f.open_and_wait(&peer_key());
    f.app.send(peer_key(), "queued").unwrap();
    let app = f.app.clone();
    wait_until("queued", Duration::from_secs(5), move || {
        !app.state().outbox.is_empty()
    });

    f.app.logout();
    let app = f.app.clone();
    wait_until("cleared", Duration::from_secs(5), move || {
        let s = app.state();
        s.outbox.is_empty() && s.current_conversation.is_none()
    });
    assert_eq!(f.network.subscriber_count(&peer_key()), 0);
}

#[test]
fn default_config_json_lists_every_key() {
    let v: serde_json::Value = serde_json::from_str(&parley_core::default_config_json()).unwrap();
    assert_eq!(v["page_size"], 20);
    assert_eq!(v["pending_timeout_secs"], 60);
    assert_eq!(v["sweep_interval_ms"], 1000);
    assert_eq!(v["app_name"], "Parley");
}
