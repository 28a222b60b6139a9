//! Integration tests for the built-in echo peer.

use std::sync::Arc;
use std::time::Duration;

use pairchat::echo::{ECHO_PREFIX, EchoPeer};
use pairchat::session::channel::{ConversationEnd, InputSource};
use pairchat::session::{SessionConfig, SessionEvent, SessionRegistry};
use pairchat::transport::memory::MemoryBus;
use pairchat_proto::presence::Presence;
use pairchat_proto::topic::TopicId;

use tokio::sync::{Mutex, mpsc};

fn fast_config() -> SessionConfig {
    SessionConfig {
        poll_interval: Duration::from_millis(10),
        drain_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn echo_peer_answers_every_line() {
    let bus = Arc::new(MemoryBus::new());
    let echo = EchoPeer::spawn("echobot", "alice", Arc::clone(&bus), fast_config())
        .await
        .expect("spawn echo peer");
    assert_eq!(echo.name(), "echobot");

    let (alice, mut events) =
        SessionRegistry::new("alice", Arc::clone(&bus), fast_config()).expect("registry");
    let alice = Arc::new(alice);

    // The peer only listens once alice has subscribed to it.
    assert!(!echo.is_listening("alice"));
    alice.add("echobot").await.expect("add echobot");
    eventually("echo peer listening", || echo.is_listening("alice")).await;
    eventually("echo peer online", || {
        alice.presence_of("echobot").ok() == Some(Presence::Online)
    })
    .await;

    let (keys, rx) = mpsc::channel(8);
    let input: InputSource = Arc::new(Mutex::new(rx));
    let chat = {
        let alice = Arc::clone(&alice);
        tokio::spawn(async move { alice.enter_conversation("echobot", input).await })
    };
    eventually("conversation open", || {
        alice.active_tab().is_active_for("echobot")
    })
    .await;

    keys.send("ping".to_string()).await.expect("type");
    let reply = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(SessionEvent::Echo { contact, sample, .. }) = events.recv().await {
                return (contact, sample);
            }
        }
    })
    .await
    .expect("echo in time");
    assert_eq!(reply.0, "echobot");
    assert_eq!(reply.1.message, format!("{ECHO_PREFIX}ping"));

    let history = alice.history_snapshot("echobot").expect("registered");
    assert_eq!(history.len(), 2);
    assert!(history[0].starts_with("alice (") && history[0].ends_with("): ping"));
    assert_eq!(history[1], "echobot: echo: ping");

    keys.send("/exit".to_string()).await.expect("type");
    assert_eq!(
        chat.await.expect("task").expect("conversation"),
        ConversationEnd::Left
    );

    echo.shutdown().await.expect("echo shutdown");
    eventually("echo peer offline", || {
        alice.presence_of("echobot").ok() == Some(Presence::Offline)
    })
    .await;
    assert_eq!(bus.writer_count(&TopicId::outbound("echobot", "alice")), 0);
    alice.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn echo_peer_rejects_invalid_names() {
    let bus = Arc::new(MemoryBus::new());
    assert!(
        EchoPeer::spawn("alice", "alice", Arc::clone(&bus), fast_config())
            .await
            .is_err()
    );
    assert!(
        EchoPeer::spawn("e", "alice", Arc::clone(&bus), fast_config())
            .await
            .is_err()
    );
}
