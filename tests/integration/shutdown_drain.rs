//! Integration tests for cooperative teardown.
//!
//! Verifies that:
//! 1. Once `remove` returns, nothing reaches the removed history.
//! 2. `shutdown` stops every loop and releases every handle.
//! 3. A drain that outlives its deadline is reported, and can be retried.
//! 4. Transport failures end only the affected channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pairchat::session::channel::{ConversationEnd, InputSource};
use pairchat::session::{SessionConfig, SessionError, SessionEvent, SessionRegistry};
use pairchat::transport::memory::MemoryBus;
use pairchat::transport::{
    InboundHandle, OutboundHandle, PresenceCallback, SampleCallback, Transport, TransportError,
    TransportType,
};
use pairchat_proto::presence::Presence;
use pairchat_proto::sample::ChatSample;
use pairchat_proto::topic::TopicId;

use tokio::sync::{Mutex, mpsc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config() -> SessionConfig {
    SessionConfig {
        poll_interval: Duration::from_millis(10),
        drain_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

fn keyboard() -> (mpsc::Sender<String>, InputSource) {
    let (tx, rx) = mpsc::channel(16);
    (tx, Arc::new(Mutex::new(rx)))
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

async fn next_matching(
    events: &mut mpsc::Receiver<SessionEvent>,
    wanted: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel open");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event in time")
}

/// A bus whose publishes can be made to fail on demand.
#[derive(Default)]
struct FlakyBus {
    inner: MemoryBus,
    failing: AtomicBool,
}

impl Transport for FlakyBus {
    fn create_outbound(
        &self,
        topic: &TopicId,
        on_presence: PresenceCallback,
    ) -> Result<OutboundHandle, TransportError> {
        self.inner.create_outbound(topic, on_presence)
    }

    fn create_inbound(
        &self,
        topic: &TopicId,
        on_sample: SampleCallback,
    ) -> Result<InboundHandle, TransportError> {
        self.inner.create_inbound(topic, on_sample)
    }

    fn publish(
        &self,
        handle: &OutboundHandle,
        sample: &ChatSample,
    ) -> Result<bool, TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.inner.publish(handle, sample)
    }

    fn destroy_outbound(&self, handle: &OutboundHandle) {
        self.inner.destroy_outbound(handle);
    }

    fn destroy_inbound(&self, handle: &InboundHandle) {
        self.inner.destroy_inbound(handle);
    }

    fn transport_type(&self) -> TransportType {
        self.inner.transport_type()
    }
}

// ===========================================================================
// Remove
// ===========================================================================

#[tokio::test]
async fn no_appends_after_remove() {
    let bus = Arc::new(MemoryBus::new());
    let (alice, _events) =
        SessionRegistry::new("alice", Arc::clone(&bus), fast_config()).expect("registry");
    alice.add("bob").await.expect("add bob");
    let history = alice.history_of("bob").expect("registered");

    let writer = bus
        .create_outbound(&TopicId::inbound("alice", "bob"), Arc::new(|_delta: i32| {}))
        .expect("writer");
    assert!(
        bus.publish(&writer, &ChatSample::new("bob", "before", 1))
            .expect("publish")
    );
    eventually("line recorded", || history.len() == 1).await;

    alice.remove("bob").await.expect("remove");

    // The reader is gone, so nothing is delivered any more.
    let delivered = bus
        .publish(&writer, &ChatSample::new("bob", "after", 2))
        .expect("publish");
    assert!(!delivered);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(history.snapshot(), vec!["bob: before".to_string()]);
    bus.destroy_outbound(&writer);
}

#[tokio::test]
async fn stuck_drain_is_reported_and_retried() {
    let bus = Arc::new(MemoryBus::new());
    let config = SessionConfig {
        poll_interval: Duration::from_millis(500),
        drain_timeout: Duration::from_millis(20),
        ..SessionConfig::default()
    };
    let (alice, _events) = SessionRegistry::new("alice", Arc::clone(&bus), config).expect("registry");
    alice.add("bob").await.expect("add bob");

    // Let both loops take their first tick so the next one is far away.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = alice.remove("bob").await.expect_err("drain cannot finish in time");
    assert!(matches!(
        err,
        SessionError::DrainTimeout { ref contact, waited }
            if contact == "bob" && waited == Duration::from_millis(20)
    ));
    assert_eq!(
        alice.list(),
        vec![("bob".to_string(), Presence::Offline)],
        "contact stays registered"
    );
    assert_eq!(bus.writer_count(&TopicId::outbound("alice", "bob")), 1);

    // The loops still observe the pending termination on their next tick.
    tokio::time::sleep(Duration::from_millis(700)).await;
    alice.remove("bob").await.expect("retry succeeds");
    assert!(alice.is_empty());
    assert_eq!(bus.writer_count(&TopicId::outbound("alice", "bob")), 0);
}

// ===========================================================================
// Shutdown
// ===========================================================================

#[tokio::test]
async fn shutdown_stops_every_session() {
    let bus = Arc::new(MemoryBus::new());
    let (alice, _events) =
        SessionRegistry::new("alice", Arc::clone(&bus), fast_config()).expect("registry");
    let contacts = ["bob", "carol", "dave"];
    for contact in contacts {
        alice.add(contact).await.expect("add");
    }

    alice.shutdown().await.expect("shutdown");

    assert!(alice.is_empty());
    for contact in contacts {
        assert_eq!(bus.writer_count(&TopicId::outbound("alice", contact)), 0);
        assert_eq!(bus.reader_count(&TopicId::inbound("alice", contact)), 0);
    }
    // Shutting down twice is harmless, and the registry is reusable.
    alice.shutdown().await.expect("second shutdown");
    alice.add("bob").await.expect("add after shutdown");
    alice.shutdown().await.expect("final shutdown");
}

// ===========================================================================
// Transport failures
// ===========================================================================

#[tokio::test]
async fn closed_bus_fails_inbound_channels() {
    let bus = Arc::new(MemoryBus::new());
    let (alice, mut events) =
        SessionRegistry::new("alice", Arc::clone(&bus), fast_config()).expect("registry");
    alice.add("bob").await.expect("add bob");

    bus.close();

    let event = next_matching(&mut events, |e| {
        matches!(e, SessionEvent::ChannelFailed { .. })
    })
    .await;
    match event {
        SessionEvent::ChannelFailed { contact, topic, .. } => {
            assert_eq!(contact, "bob");
            assert_eq!(topic, TopicId::inbound("alice", "bob"));
        }
        other => panic!("expected ChannelFailed, got {other:?}"),
    }

    // The contact is still listed and can be removed cleanly.
    assert_eq!(alice.len(), 1);
    alice.remove("bob").await.expect("remove after failure");
}

#[tokio::test]
async fn publish_failure_closes_only_that_channel() {
    let bus = Arc::new(FlakyBus::default());
    let (alice, mut events) =
        SessionRegistry::new("alice", Arc::clone(&bus), fast_config()).expect("registry");
    alice.add("bob").await.expect("add bob");
    alice.add("carol").await.expect("add carol");
    bus.inner
        .inject_presence_delta(&TopicId::outbound("alice", "bob"), 1);

    let alice = Arc::new(alice);

    let (keys, input) = keyboard();
    let chat = {
        let alice = Arc::clone(&alice);
        let input = Arc::clone(&input);
        tokio::spawn(async move { alice.enter_conversation("bob", input).await })
    };
    eventually("conversation open", || alice.active_tab().is_active_for("bob")).await;

    bus.failing.store(true, Ordering::SeqCst);
    keys.send("doomed".into()).await.expect("type");
    assert_eq!(
        chat.await.expect("task").expect("conversation"),
        ConversationEnd::ChannelClosed
    );
    // The rejected line was never sent, so it is not in the history.
    assert!(alice.history_snapshot("bob").expect("registered").is_empty());

    let event = next_matching(&mut events, |e| {
        matches!(e, SessionEvent::ChannelFailed { .. })
    })
    .await;
    assert!(matches!(
        event,
        SessionEvent::ChannelFailed { ref contact, ref topic, .. }
            if contact == "bob" && *topic == TopicId::outbound("alice", "bob")
    ));

    // The closed channel refuses new conversations; its sibling does not.
    let (_more_keys, more_input) = keyboard();
    assert!(matches!(
        alice.enter_conversation("bob", more_input).await,
        Err(SessionError::ChannelClosed(name)) if name == "bob"
    ));
    assert!(matches!(
        alice.enter_conversation("carol", input).await,
        Ok(ConversationEnd::PeerUnreachable)
    ));

    alice.shutdown().await.expect("shutdown");
}
