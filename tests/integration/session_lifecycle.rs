//! Integration tests for contact lifecycle: add, list, remove.
//!
//! Verifies that:
//! 1. A new contact is listed offline until its peer subscribes.
//! 2. Invalid and duplicate names are rejected without side effects.
//! 3. A failed channel creation leaves nothing behind.
//! 4. Removal releases both transport handles and can be repeated safely.

use std::sync::Arc;
use std::time::Duration;

use pairchat::session::{SessionConfig, SessionError, SessionEvent, SessionRegistry};
use pairchat::transport::memory::MemoryBus;
use pairchat::transport::{
    InboundHandle, OutboundHandle, PresenceCallback, SampleCallback, Transport, TransportError,
    TransportType,
};
use pairchat_proto::presence::Presence;
use pairchat_proto::sample::ChatSample;
use pairchat_proto::topic::TopicId;
use pairchat_proto::username::NameError;

use tokio::sync::mpsc;

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

fn registry_on<T: Transport>(
    name: &str,
    transport: &Arc<T>,
) -> (SessionRegistry<T>, mpsc::Receiver<SessionEvent>) {
    SessionRegistry::new(name, Arc::clone(transport), fast_config()).expect("valid local user")
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

/// A bus that refuses to create readers.
struct NoReaders(MemoryBus);

impl Transport for NoReaders {
    fn create_outbound(
        &self,
        topic: &TopicId,
        on_presence: PresenceCallback,
    ) -> Result<OutboundHandle, TransportError> {
        self.0.create_outbound(topic, on_presence)
    }

    fn create_inbound(
        &self,
        _topic: &TopicId,
        _on_sample: SampleCallback,
    ) -> Result<InboundHandle, TransportError> {
        Err(TransportError::Closed)
    }

    fn publish(
        &self,
        handle: &OutboundHandle,
        sample: &ChatSample,
    ) -> Result<bool, TransportError> {
        self.0.publish(handle, sample)
    }

    fn destroy_outbound(&self, handle: &OutboundHandle) {
        self.0.destroy_outbound(handle);
    }

    fn destroy_inbound(&self, handle: &InboundHandle) {
        self.0.destroy_inbound(handle);
    }

    fn transport_type(&self) -> TransportType {
        self.0.transport_type()
    }
}

// ===========================================================================
// Add and list
// ===========================================================================

#[tokio::test]
async fn added_contact_is_offline_until_matched() {
    let bus = Arc::new(MemoryBus::new());
    let (alice, _events) = registry_on("alice", &bus);

    alice.add("bob").await.expect("add bob");
    assert_eq!(alice.list(), vec![("bob".to_string(), Presence::Offline)]);
    assert_eq!(
        alice.history_snapshot("bob").expect("bob registered"),
        Vec::<String>::new()
    );

    // Bob comes online by adding Alice on the same bus.
    let (bob, _bob_events) = registry_on("bob", &bus);
    bob.add("alice").await.expect("add alice");
    eventually("bob online for alice", || {
        alice.presence_of("bob").ok() == Some(Presence::Online)
    })
    .await;
    assert_eq!(alice.list(), vec![("bob".to_string(), Presence::Online)]);

    // And goes offline again when he removes her.
    bob.remove("alice").await.expect("remove alice");
    eventually("bob offline for alice", || {
        alice.presence_of("bob").ok() == Some(Presence::Offline)
    })
    .await;

    alice.shutdown().await.expect("shutdown alice");
    bob.shutdown().await.expect("shutdown bob");
}

#[tokio::test]
async fn invalid_and_duplicate_names_are_rejected() {
    let bus = Arc::new(MemoryBus::new());
    let (alice, _events) = registry_on("alice", &bus);

    assert!(matches!(
        alice.add("bo").await,
        Err(SessionError::InvalidName(NameError::TooShort))
    ));
    assert!(matches!(
        alice.add(&"b".repeat(33)).await,
        Err(SessionError::InvalidName(NameError::TooLong))
    ));
    assert!(matches!(
        alice.add("bob smith").await,
        Err(SessionError::InvalidName(NameError::Whitespace))
    ));
    assert!(matches!(
        alice.add("Notes").await,
        Err(SessionError::InvalidName(NameError::Reserved(_)))
    ));
    assert!(matches!(
        alice.add("alice").await,
        Err(SessionError::InvalidName(NameError::SelfContact))
    ));
    assert!(alice.is_empty());

    alice.add("bob").await.expect("first add");
    assert!(matches!(
        alice.add("bob").await,
        Err(SessionError::DuplicateContact(name)) if name == "bob"
    ));
    assert_eq!(alice.len(), 1);
    assert_eq!(bus.writer_count(&TopicId::outbound("alice", "bob")), 1);
    assert_eq!(bus.reader_count(&TopicId::inbound("alice", "bob")), 1);

    alice.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn contacts_with_colliding_topics_are_rejected() {
    let bus = Arc::new(MemoryBus::new());
    let (abc, _events) = registry_on("abc", &bus);

    // `abc` writes to `q_abc` on `abc_q_abc`, which is where `abc_q` writes
    // to `abc`.
    abc.add("q_abc").await.expect("add q_abc");
    let err = abc
        .add("abc_q")
        .await
        .expect_err("abc_q shares a topic with q_abc");
    assert!(matches!(
        err,
        SessionError::TopicConflict { ref contact, ref topic }
            if contact == "abc_q" && *topic == TopicId::new("abc_q_abc")
    ));
    assert_eq!(abc.list(), vec![("q_abc".to_string(), Presence::Offline)]);
    assert_eq!(bus.writer_count(&TopicId::new("abc_q_abc")), 1);
    assert_eq!(bus.reader_count(&TopicId::new("abc_q_abc")), 0);

    // Without a reader of its own on that topic, q_abc never looks online.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        abc.presence_of("q_abc").expect("registered"),
        Presence::Offline
    );

    // Once q_abc is gone the topic is free, and abc_q receives normally.
    abc.remove("q_abc").await.expect("remove q_abc");
    abc.add("abc_q").await.expect("topic free again");
    let writer = bus
        .create_outbound(&TopicId::inbound("abc", "abc_q"), Arc::new(|_delta: i32| {}))
        .expect("peer writer");
    assert!(
        bus.publish(&writer, &ChatSample::new("abc_q", "still here", 1))
            .expect("publish")
    );
    let history = abc.history_of("abc_q").expect("registered");
    eventually("line from abc_q", || history.len() == 1).await;
    assert_eq!(history.snapshot(), vec!["abc_q: still here".to_string()]);

    bus.destroy_outbound(&writer);
    abc.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn failed_channel_creation_leaves_no_trace() {
    let bus = Arc::new(NoReaders(MemoryBus::new()));
    let (alice, _events) = registry_on("alice", &bus);

    let result = alice.add("bob").await;
    assert!(matches!(result, Err(SessionError::TransportUnavailable(_))));
    assert!(alice.is_empty());
    assert_eq!(bus.0.writer_count(&TopicId::outbound("alice", "bob")), 0);
}

#[tokio::test]
async fn add_fails_on_closed_transport() {
    let bus = Arc::new(MemoryBus::new());
    let (alice, _events) = registry_on("alice", &bus);
    bus.close();

    assert!(matches!(
        alice.add("bob").await,
        Err(SessionError::TransportUnavailable(TransportError::Closed))
    ));
    assert!(alice.list().is_empty());
}

// ===========================================================================
// Remove
// ===========================================================================

#[tokio::test]
async fn remove_releases_handles_and_forgets_contact() {
    let bus = Arc::new(MemoryBus::new());
    let (alice, _events) = registry_on("alice", &bus);
    let outbound = TopicId::outbound("alice", "bob");
    let inbound = TopicId::inbound("alice", "bob");

    alice.add("bob").await.expect("add bob");
    alice.add("carol").await.expect("add carol");
    alice.remove("bob").await.expect("remove bob");

    assert_eq!(bus.writer_count(&outbound), 0);
    assert_eq!(bus.reader_count(&inbound), 0);
    assert_eq!(
        alice.list(),
        vec![("carol".to_string(), Presence::Offline)],
        "siblings survive a removal"
    );
    assert!(matches!(
        alice.history_snapshot("bob"),
        Err(SessionError::NotFound(_))
    ));

    // A second removal reports the contact as unknown.
    assert!(matches!(
        alice.remove("bob").await,
        Err(SessionError::NotFound(name)) if name == "bob"
    ));

    alice.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn contact_can_be_added_again_after_removal() {
    let bus = Arc::new(MemoryBus::new());
    let (alice, _events) = registry_on("alice", &bus);
    let (bob, _bob_events) = registry_on("bob", &bus);
    bob.add("alice").await.expect("bob adds alice");

    alice.add("bob").await.expect("add bob");
    alice.remove("bob").await.expect("remove bob");
    alice.add("bob").await.expect("re-add bob");

    // The fresh pair is matched and its loops are running.
    eventually("bob online again", || {
        alice.presence_of("bob").ok() == Some(Presence::Online)
    })
    .await;
    assert_eq!(bus.writer_count(&TopicId::outbound("alice", "bob")), 1);
    assert!(alice.history_snapshot("bob").expect("registered").is_empty());

    alice.shutdown().await.expect("shutdown alice");
    bob.shutdown().await.expect("shutdown bob");
}
