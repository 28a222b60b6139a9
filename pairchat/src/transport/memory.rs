//! In-process topic bus.
//!
//! Every [`MemoryBus`] is a self-contained publish/subscribe domain.
//! Writers and readers created on the same topic are matched
//! immediately, and each match or unmatch is reported to the writer as a
//! `+1` / `-1` presence delta. Published samples are encoded with the
//! wire codec and decoded once per reader, so the bus exercises the same
//! serialization path a networked substrate would.
//!
//! Callbacks run while the bus holds its internal lock. They must not
//! call back into the bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use pairchat_proto::codec;
use pairchat_proto::sample::ChatSample;
use pairchat_proto::topic::TopicId;

use super::{
    InboundHandle, OutboundHandle, PresenceCallback, SampleCallback, Transport, TransportError,
    TransportType,
};

/// Writers and readers registered on one topic.
#[derive(Default)]
struct TopicEntry {
    writers: HashMap<u64, PresenceCallback>,
    readers: HashMap<u64, SampleCallback>,
}

impl TopicEntry {
    fn is_empty(&self) -> bool {
        self.writers.is_empty() && self.readers.is_empty()
    }

    fn notify_writers(&self, delta: i32) {
        for on_presence in self.writers.values() {
            on_presence(delta);
        }
    }
}

#[derive(Default)]
struct BusState {
    closed: bool,
    topics: HashMap<TopicId, TopicEntry>,
}

/// In-process publish/subscribe bus implementing [`Transport`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use pairchat::transport::memory::MemoryBus;
/// use pairchat::transport::Transport;
/// use pairchat_proto::sample::ChatSample;
/// use pairchat_proto::topic::TopicId;
///
/// let bus = MemoryBus::new();
/// let topic = TopicId::outbound("alice", "bob");
/// let writer = bus.create_outbound(&topic, Arc::new(|_delta: i32| {})).unwrap();
/// assert!(!bus.publish(&writer, &ChatSample::new("alice", "hi", 1)).unwrap());
///
/// let _reader = bus.create_inbound(&topic, Arc::new(|_sample: ChatSample| {})).unwrap();
/// assert!(bus.publish(&writer, &ChatSample::new("alice", "hi", 2)).unwrap());
/// ```
#[derive(Default)]
pub struct MemoryBus {
    state: RwLock<BusState>,
    next_id: AtomicU64,
}

impl MemoryBus {
    /// Creates an empty, open bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a substrate failure.
    ///
    /// Every matched writer is told its readers went away, all readers and
    /// writers are dropped, and every later operation fails with
    /// [`TransportError::Closed`].
    pub fn close(&self) {
        let mut state = self.state.write();
        if state.closed {
            return;
        }
        state.closed = true;
        for entry in state.topics.values() {
            for _ in 0..entry.readers.len() {
                entry.notify_writers(-1);
            }
        }
        state.topics.clear();
        drop(state);
        tracing::warn!("memory bus closed");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Delivers an arbitrary presence delta to every writer on `topic`.
    ///
    /// Well-behaved substrates only report `+1` and `-1`. This exists to
    /// exercise how writers cope with anything else.
    pub fn inject_presence_delta(&self, topic: &TopicId, delta: i32) {
        let state = self.state.read();
        if let Some(entry) = state.topics.get(topic) {
            entry.notify_writers(delta);
        }
    }

    /// Number of live writers on `topic`.
    #[must_use]
    pub fn writer_count(&self, topic: &TopicId) -> usize {
        self.state
            .read()
            .topics
            .get(topic)
            .map_or(0, |entry| entry.writers.len())
    }

    /// Number of live readers on `topic`.
    #[must_use]
    pub fn reader_count(&self, topic: &TopicId) -> usize {
        self.state
            .read()
            .topics
            .get(topic)
            .map_or(0, |entry| entry.readers.len())
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Transport for MemoryBus {
    fn create_outbound(
        &self,
        topic: &TopicId,
        on_presence: PresenceCallback,
    ) -> Result<OutboundHandle, TransportError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let id = self.allocate_id();
        let entry = state.topics.entry(topic.clone()).or_default();
        for _ in 0..entry.readers.len() {
            on_presence(1);
        }
        entry.writers.insert(id, on_presence);
        drop(state);

        tracing::debug!(%topic, id, "writer created");
        Ok(OutboundHandle::new(id, topic.clone()))
    }

    fn create_inbound(
        &self,
        topic: &TopicId,
        on_sample: SampleCallback,
    ) -> Result<InboundHandle, TransportError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let id = self.allocate_id();
        let entry = state.topics.entry(topic.clone()).or_default();
        entry.readers.insert(id, on_sample);
        entry.notify_writers(1);
        drop(state);

        tracing::debug!(%topic, id, "reader created");
        Ok(InboundHandle::new(id, topic.clone()))
    }

    fn publish(
        &self,
        handle: &OutboundHandle,
        sample: &ChatSample,
    ) -> Result<bool, TransportError> {
        let state = self.state.read();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let entry = state
            .topics
            .get(handle.topic())
            .filter(|entry| entry.writers.contains_key(&handle.id()))
            .ok_or_else(|| TransportError::UnknownHandle {
                id: handle.id(),
                topic: handle.topic().clone(),
            })?;

        let bytes = codec::encode(sample)?;
        for (reader_id, on_sample) in &entry.readers {
            match codec::decode(&bytes) {
                Ok(delivered) => on_sample(delivered),
                Err(e) => {
                    tracing::warn!(topic = %handle.topic(), reader_id, error = %e, "dropping undecodable sample");
                }
            }
        }
        Ok(!entry.readers.is_empty())
    }

    fn destroy_outbound(&self, handle: &OutboundHandle) {
        let mut state = self.state.write();
        if let Some(entry) = state.topics.get_mut(handle.topic()) {
            entry.writers.remove(&handle.id());
            if entry.is_empty() {
                state.topics.remove(handle.topic());
            }
        }
        drop(state);
        tracing::debug!(topic = %handle.topic(), id = handle.id(), "writer destroyed");
    }

    fn destroy_inbound(&self, handle: &InboundHandle) {
        let mut state = self.state.write();
        if let Some(entry) = state.topics.get_mut(handle.topic()) {
            if entry.readers.remove(&handle.id()).is_some() {
                entry.notify_writers(-1);
            }
            if entry.is_empty() {
                state.topics.remove(handle.topic());
            }
        }
        drop(state);
        tracing::debug!(topic = %handle.topic(), id = handle.id(), "reader destroyed");
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Memory
    }
}
