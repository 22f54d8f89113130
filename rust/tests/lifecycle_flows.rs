//! Startup, readiness and delivery flows against the in-memory backend.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use postbox_core::{
    Chat, ChatId, ConfigureFailurePolicy, Credentials, LifecycleState, Message, MessageHandler,
    MsgId, Postbox, PostboxConfig, RawEvent, StartError,
};
use postbox_memory_backend::MemoryBackend;
use tempfile::tempdir;

mod support;
use support::{chat, message, wait_until, write_config, Collector};

const TIMEOUT: Duration = Duration::from_secs(5);

fn creds() -> Credentials {
    Credentials::new("bot@example.org", "app-password")
}

fn config(dir: &std::path::Path) -> PostboxConfig {
    PostboxConfig {
        data_dir: dir.to_path_buf(),
        ..PostboxConfig::default()
    }
    .with_credentials(creds())
}

/// Backend with chat 7 / message 42 (known sender) and chat 3 / message 99
/// (unknown sender, promoted into chat 55), plus a sentinel message 500.
fn seeded_backend(configured: bool) -> Arc<MemoryBackend> {
    Arc::new(
        MemoryBackend::new()
            .with_configured(configured)
            .with_chats([chat(7, "alice"), chat(3, "deaddrop"), chat(1, "sentinel")])
            .with_messages([
                message(42, 7, false),
                message(99, 3, true),
                message(500, 1, false),
                message(501, 1, false),
            ])
            .with_promotion(MsgId(99), ChatId(55)),
    )
}

fn incoming(chat_id: u32, msg_id: u32) -> RawEvent {
    RawEvent::IncomingMessage {
        chat_id: ChatId(chat_id),
        msg_id: MsgId(msg_id),
    }
}

fn changed(chat_id: u32, msg_id: u32) -> RawEvent {
    RawEvent::MessagesChanged {
        chat_id: ChatId(chat_id),
        msg_id: MsgId(msg_id),
    }
}

fn progress(permille: u16) -> RawEvent {
    RawEvent::ConfigureProgress { permille }
}

/// Emit a sentinel delivery and wait for it, so every event emitted before
/// it has been handled by the core.
fn flush(backend: &MemoryBackend, collector: &Collector, sentinel: u32) {
    let before = collector.len();
    assert!(backend.emit(incoming(1, sentinel)));
    wait_until("sentinel delivered", TIMEOUT, || collector.len() > before);
}

fn wait_started(backend: &MemoryBackend) {
    wait_until("store opened", TIMEOUT, || backend.is_open());
}

#[test]
fn first_run_configures_and_resolves_at_full_progress() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(false);
    let collector = Collector::new();

    let (postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_until("configure called", TIMEOUT, || {
        !backend.configure_calls().is_empty()
    });
    assert_eq!(backend.configure_calls(), vec![creds()]);
    assert_eq!(backend.open_root().as_deref(), Some(dir.path()));

    // Connection comes before configuration finishes; it must not count.
    backend.emit(RawEvent::ImapConnected);
    backend.emit(progress(250));
    backend.emit(progress(500));
    flush(&backend, &collector, 500);
    assert!(!ready.is_settled());
    assert_eq!(postbox.state(), LifecycleState::Configuring);

    backend.emit(progress(1000));
    assert_eq!(ready.wait_timeout(TIMEOUT), Ok(()));
    assert_eq!(postbox.state(), LifecycleState::Ready);
    assert_eq!(backend.configure_calls().len(), 1);
}

#[test]
fn configured_store_resolves_on_first_connection_only() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);
    let collector = Collector::new();

    let (postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_started(&backend);

    backend.emit(progress(1000));
    flush(&backend, &collector, 500);
    assert!(!ready.is_settled());
    assert!(backend.configure_calls().is_empty());

    backend.emit(RawEvent::ImapConnected);
    assert_eq!(ready.wait_timeout(TIMEOUT), Ok(()));
    assert_eq!(postbox.state(), LifecycleState::Ready);
}

#[test]
fn reconnections_after_ready_change_nothing() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);
    let collector = Collector::new();

    let (postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_started(&backend);
    backend.emit(RawEvent::ImapConnected);
    assert_eq!(ready.wait_timeout(TIMEOUT), Ok(()));

    for _ in 0..10 {
        backend.emit(RawEvent::ImapConnected);
    }
    flush(&backend, &collector, 500);
    assert_eq!(postbox.state(), LifecycleState::Ready);
    assert_eq!(collector.ids(), vec![(ChatId(1), MsgId(500))]);
}

#[test]
fn incoming_message_after_ready_is_delivered_once() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);
    let collector = Collector::new();

    let (_postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_started(&backend);
    backend.emit(RawEvent::ImapConnected);
    assert_eq!(ready.wait_timeout(TIMEOUT), Ok(()));

    backend.emit(incoming(7, 42));
    wait_until("delivery", TIMEOUT, || collector.len() == 1);
    flush(&backend, &collector, 500);

    let ids = collector.ids();
    assert_eq!(ids[0], (ChatId(7), MsgId(42)));
    assert_eq!(ids.iter().filter(|(_, m)| *m == MsgId(42)).count(), 1);
}

#[test]
fn unknown_sender_message_is_promoted_and_delivered_to_new_chat() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);
    let collector = Collector::new();

    let (_postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_started(&backend);
    backend.emit(RawEvent::ImapConnected);
    assert_eq!(ready.wait_timeout(TIMEOUT), Ok(()));

    backend.emit(changed(3, 99));
    wait_until("delivery", TIMEOUT, || collector.len() == 1);
    // The engine fires another change once the message moved; no second delivery.
    backend.emit(changed(55, 99));
    flush(&backend, &collector, 500);

    let deliveries = collector.0.lock().unwrap().clone();
    let promoted: Vec<_> = deliveries
        .iter()
        .filter(|(_, m)| m.id == MsgId(99))
        .collect();
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].0.id, ChatId(55));
    assert_eq!(promoted[0].1.chat_id, ChatId(55));
    assert!(deliveries.iter().all(|(c, _)| c.id != ChatId(3)));
    assert_eq!(backend.promote_calls(), vec![MsgId(99)]);
}

#[test]
fn change_of_known_message_is_not_delivered() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);
    let collector = Collector::new();

    let (_postbox, _ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_started(&backend);

    backend.emit(changed(7, 42));
    backend.emit(changed(0, 0));
    flush(&backend, &collector, 500);
    assert_eq!(collector.ids(), vec![(ChatId(1), MsgId(500))]);
    assert!(backend.promote_calls().is_empty());
}

#[test]
fn incoming_then_changed_for_same_message_delivers_once() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);
    let collector = Collector::new();

    let (_postbox, _ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_started(&backend);

    // Same id announced both ways while it still looks unclassified.
    backend.emit(incoming(3, 99));
    backend.emit(changed(3, 99));
    flush(&backend, &collector, 500);

    let count = collector
        .ids()
        .iter()
        .filter(|(_, m)| *m == MsgId(99))
        .count();
    assert_eq!(count, 1);
    assert!(backend.promote_calls().is_empty());
}

#[test]
fn messages_before_readiness_are_still_delivered() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(false);
    let collector = Collector::new();

    let (_postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_until("configure called", TIMEOUT, || {
        !backend.configure_calls().is_empty()
    });

    backend.emit(incoming(7, 42));
    wait_until("delivery", TIMEOUT, || collector.len() == 1);
    assert!(!ready.is_settled());
}

#[test]
fn missing_lookup_is_skipped() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);
    let collector = Collector::new();

    let (_postbox, _ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_started(&backend);

    backend.emit(incoming(7, 4242));
    backend.emit(incoming(8080, 42));
    flush(&backend, &collector, 500);
    assert_eq!(collector.ids(), vec![(ChatId(1), MsgId(500))]);

    // Neither failure poisoned the id.
    backend.emit(incoming(7, 42));
    wait_until("delivery", TIMEOUT, || collector.len() == 2);
}

#[test]
fn promoted_message_whose_lookup_failed_is_delivered_on_next_change() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);
    let collector = Collector::new();

    let (_postbox, _ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_started(&backend);

    backend.fail_next_chat_lookups(1);
    backend.emit(changed(3, 99));
    flush(&backend, &collector, 500);
    assert_eq!(collector.ids(), vec![(ChatId(1), MsgId(500))]);
    assert_eq!(backend.promote_calls(), vec![MsgId(99)]);

    // The message now lives in chat 55 and is no longer unclassified.
    backend.emit(changed(55, 99));
    wait_until("delivery", TIMEOUT, || collector.len() == 2);
    assert_eq!(collector.ids()[1], (ChatId(55), MsgId(99)));
    assert_eq!(backend.promote_calls(), vec![MsgId(99)]);
}

#[test]
fn open_failure_rejects_with_cause() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(MemoryBackend::new().with_open_error("database is locked"));

    let (postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), Collector::new()).unwrap();
    match ready.wait_timeout(TIMEOUT) {
        Err(StartError::OpenFailure { cause }) => assert!(cause.contains("database is locked")),
        other => panic!("expected OpenFailure, got {other:?}"),
    }
    assert!(backend.configure_calls().is_empty());
    assert_eq!(postbox.state(), LifecycleState::Configuring);

    postbox.shutdown();
    assert_eq!(backend.close_count(), 1);
}

#[test]
fn missing_credentials_reject() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(false);
    let cfg = PostboxConfig {
        data_dir: dir.path().to_path_buf(),
        ..PostboxConfig::default()
    };

    let (_postbox, ready) = Postbox::start(backend.clone(), cfg, Collector::new()).unwrap();
    assert_eq!(
        ready.wait_timeout(TIMEOUT),
        Err(StartError::MissingCredentials)
    );
    assert!(backend.configure_calls().is_empty());
}

#[test]
fn configure_error_rejects() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(MemoryBackend::new().with_configure_error("auth rejected"));

    let (_postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), Collector::new()).unwrap();
    match ready.wait_timeout(TIMEOUT) {
        Err(StartError::ConfigurationFailure { cause }) => assert!(cause.contains("auth rejected")),
        other => panic!("expected ConfigurationFailure, got {other:?}"),
    }
}

#[test]
fn configure_failure_event_follows_policy() {
    // Wait (default): still pending.
    let dir = tempdir().unwrap();
    let backend = seeded_backend(false);
    let collector = Collector::new();
    let (_postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), collector.clone()).unwrap();
    wait_until("configure called", TIMEOUT, || {
        !backend.configure_calls().is_empty()
    });
    backend.emit(progress(0));
    flush(&backend, &collector, 500);
    assert!(!ready.is_settled());

    // Fail: rejects.
    let dir = tempdir().unwrap();
    let backend = seeded_backend(false);
    let cfg = PostboxConfig {
        configure_failure: ConfigureFailurePolicy::Fail,
        ..config(dir.path())
    };
    let (_postbox, ready) = Postbox::start(backend.clone(), cfg, Collector::new()).unwrap();
    wait_until("configure called", TIMEOUT, || {
        !backend.configure_calls().is_empty()
    });
    backend.emit(progress(0));
    assert!(matches!(
        ready.wait_timeout(TIMEOUT),
        Err(StartError::ConfigurationFailure { .. })
    ));
}

#[test]
fn shutdown_before_ready_fails_future_and_closes_once() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);

    let (postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), Collector::new()).unwrap();
    wait_started(&backend);
    postbox.shutdown();

    assert_eq!(ready.wait_timeout(TIMEOUT), Err(StartError::Shutdown));
    assert_eq!(backend.close_count(), 1);
    assert!(!backend.is_open());
    assert!(!backend.has_subscriber());
}

#[test]
fn dropping_handle_after_ready_closes_backend() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);

    let (postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), Collector::new()).unwrap();
    wait_started(&backend);
    backend.emit(RawEvent::ImapConnected);
    assert_eq!(ready.wait_timeout(TIMEOUT), Ok(()));

    drop(postbox);
    assert_eq!(backend.close_count(), 1);
    assert!(!backend.emit(RawEvent::ImapConnected));
}

struct PanickingHandler;

impl MessageHandler for PanickingHandler {
    fn on_new_message(&self, _chat: Chat, _message: Message) {
        panic!("handler failed");
    }
}

#[test]
fn panicking_handler_still_closes_backend_once() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);

    let (postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), PanickingHandler).unwrap();
    wait_started(&backend);
    backend.emit(incoming(7, 42));

    wait_until("backend closed", TIMEOUT, || backend.close_count() == 1);
    assert_eq!(ready.wait_timeout(TIMEOUT), Err(StartError::Shutdown));

    drop(postbox);
    assert_eq!(backend.close_count(), 1);
    assert!(!backend.has_subscriber());
}

#[test]
fn store_root_comes_from_config_file() {
    let dir = tempdir().unwrap();
    let store = tempdir().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({
            "email_address": "bot@example.org",
            "email_password": "app-password",
            "store_dir": store.path(),
        }),
    );
    let cfg = PostboxConfig::load_file(dir.path()).unwrap();
    let backend = seeded_backend(false);

    let (_postbox, _ready) = Postbox::start(backend.clone(), cfg, Collector::new()).unwrap();
    wait_until("configure called", TIMEOUT, || {
        !backend.configure_calls().is_empty()
    });
    assert_eq!(backend.open_root().as_deref(), Some(store.path()));
    assert_eq!(backend.configure_calls(), vec![creds()]);
}

#[tokio::test]
async fn readiness_can_be_awaited() {
    let dir = tempdir().unwrap();
    let backend = seeded_backend(true);

    let (_postbox, ready) =
        Postbox::start(backend.clone(), config(dir.path()), Collector::new()).unwrap();
    let emitter = backend.clone();
    std::thread::spawn(move || {
        wait_until("store opened", TIMEOUT, || emitter.is_open());
        emitter.emit(RawEvent::ImapConnected);
    });

    let res = tokio::time::timeout(TIMEOUT, ready.into_future()).await;
    assert_eq!(res.expect("readiness timed out"), Ok(()));
}
