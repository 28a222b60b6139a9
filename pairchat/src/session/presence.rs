//! Presence tracking for outbound channels.
//!
//! The tracker is a two-state machine (`Offline -> Online -> Offline`)
//! driven only by the transport's matched-count deltas.

use std::sync::Arc;

use parking_lot::RwLock;

use pairchat_proto::presence::Presence;
use pairchat_proto::topic::TopicId;

use crate::transport::PresenceCallback;

/// Reachability of the peer behind one outbound topic.
#[derive(Debug)]
pub struct PresenceTracker {
    topic: TopicId,
    state: RwLock<Presence>,
}

impl PresenceTracker {
    /// Creates a tracker for `topic`, starting [`Presence::Offline`].
    #[must_use]
    pub fn new(topic: TopicId) -> Self {
        Self {
            topic,
            state: RwLock::new(Presence::Offline),
        }
    }

    /// Current presence.
    #[must_use]
    pub fn current(&self) -> Presence {
        *self.state.read()
    }

    /// Returns `true` if the peer is currently reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Applies a matched-count delta reported by the transport.
    ///
    /// `+1` moves to [`Presence::Online`] and `-1` to [`Presence::Offline`].
    /// Anything else is logged and ignored. Returns the resulting presence.
    pub fn apply_delta(&self, delta: i32) -> Presence {
        let next = match delta {
            1 => Presence::Online,
            -1 => Presence::Offline,
            other => {
                tracing::warn!(
                    topic = %self.topic,
                    delta = other,
                    "ignoring presence change that is not +1 or -1"
                );
                return self.current();
            }
        };

        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            tracing::info!(topic = %self.topic, from = %previous, to = %next, "presence changed");
        }
        next
    }

    /// Builds the callback handed to [`Transport::create_outbound`](crate::transport::Transport::create_outbound).
    #[must_use]
    pub fn callback(self: &Arc<Self>) -> PresenceCallback {
        let tracker = Arc::clone(self);
        Arc::new(move |delta| {
            tracker.apply_delta(delta);
        })
    }
}
