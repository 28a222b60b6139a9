//! Transport port consumed by the session layer.
//!
//! Defines the [`Transport`] trait that every publish/subscribe substrate
//! must satisfy. The session core creates one writer and one reader per
//! contact, publishes [`ChatSample`]s through the writer, and receives
//! samples and presence changes through callbacks registered at creation.
//!
//! Concrete implementations:
//! - [`memory::MemoryBus`]: in-process topic bus for tests and demo mode

pub mod memory;

use std::fmt;
use std::sync::Arc;

use pairchat_proto::codec::CodecError;
use pairchat_proto::sample::ChatSample;
use pairchat_proto::topic::TopicId;

/// Callback invoked for every sample delivered to a reader.
pub type SampleCallback = Arc<dyn Fn(ChatSample) + Send + Sync>;

/// Callback invoked with the signed change in matched-reader count of a
/// writer. Well-formed transports only ever report `+1` or `-1`.
pub type PresenceCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Opaque handle to a writer created by [`Transport::create_outbound`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutboundHandle {
    id: u64,
    topic: TopicId,
}

/// Opaque handle to a reader created by [`Transport::create_inbound`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InboundHandle {
    id: u64,
    topic: TopicId,
}

macro_rules! handle_accessors {
    ($ty:ty) => {
        impl $ty {
            /// Creates a handle. Only transport implementations should call this.
            #[must_use]
            pub const fn new(id: u64, topic: TopicId) -> Self {
                Self { id, topic }
            }

            /// Transport-assigned identifier.
            #[must_use]
            pub const fn id(&self) -> u64 {
                self.id
            }

            /// Topic this handle is bound to.
            #[must_use]
            pub const fn topic(&self) -> &TopicId {
                &self.topic
            }
        }
    };
}

handle_accessors!(OutboundHandle);
handle_accessors!(InboundHandle);

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport has shut down and accepts no further operations.
    #[error("transport closed")]
    Closed,

    /// The handle was never created by this transport or was already destroyed.
    #[error("unknown handle {id} on topic {topic}")]
    UnknownHandle {
        /// Identifier of the stale handle.
        id: u64,
        /// Topic the handle was bound to.
        topic: TopicId,
    },

    /// The sample could not be encoded for delivery.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Describes which kind of substrate is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// In-process topic bus.
    Memory,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "Memory"),
        }
    }
}

/// Publish/subscribe substrate carrying chat samples between users.
///
/// A writer on topic `T` is matched with every reader on `T`. Each match
/// and unmatch is reported to the writer's [`PresenceCallback`] as `+1` or
/// `-1`. Matching, discovery and delivery guarantees are entirely the
/// transport's business.
///
/// # Invariant
///
/// After `destroy_inbound` returns, the reader's callback is never invoked
/// again, and after `destroy_outbound` returns, the writer's presence
/// callback is never invoked again.
pub trait Transport: Send + Sync + 'static {
    /// Create a writer on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the writer cannot be created.
    fn create_outbound(
        &self,
        topic: &TopicId,
        on_presence: PresenceCallback,
    ) -> Result<OutboundHandle, TransportError>;

    /// Create a reader on `topic` that hands every sample to `on_sample`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the reader cannot be created.
    fn create_inbound(
        &self,
        topic: &TopicId,
        on_sample: SampleCallback,
    ) -> Result<InboundHandle, TransportError>;

    /// Publish a sample through a writer.
    ///
    /// Returns `Ok(true)` if at least one matched reader received it and
    /// `Ok(false)` if no reader is currently matched.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the writer is gone or the transport
    /// has failed. Callers should treat this as non-recoverable.
    fn publish(&self, handle: &OutboundHandle, sample: &ChatSample)
    -> Result<bool, TransportError>;

    /// Destroy a writer. Destroying an unknown handle is a no-op.
    fn destroy_outbound(&self, handle: &OutboundHandle);

    /// Destroy a reader. Destroying an unknown handle is a no-op.
    fn destroy_inbound(&self, handle: &InboundHandle);

    /// Return the type of this transport.
    fn transport_type(&self) -> TransportType;
}

impl<T: Transport> Transport for Arc<T> {
    fn create_outbound(
        &self,
        topic: &TopicId,
        on_presence: PresenceCallback,
    ) -> Result<OutboundHandle, TransportError> {
        (**self).create_outbound(topic, on_presence)
    }

    fn create_inbound(
        &self,
        topic: &TopicId,
        on_sample: SampleCallback,
    ) -> Result<InboundHandle, TransportError> {
        (**self).create_inbound(topic, on_sample)
    }

    fn publish(
        &self,
        handle: &OutboundHandle,
        sample: &ChatSample,
    ) -> Result<bool, TransportError> {
        (**self).publish(handle, sample)
    }

    fn destroy_outbound(&self, handle: &OutboundHandle) {
        (**self).destroy_outbound(handle);
    }

    fn destroy_inbound(&self, handle: &InboundHandle) {
        (**self).destroy_inbound(handle);
    }

    fn transport_type(&self) -> TransportType {
        (**self).transport_type()
    }
}
