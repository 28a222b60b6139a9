//! Session layer: one channel pair per contact, managed by a registry.
//!
//! [`SessionRegistry`] is the management surface. It validates contact
//! names, opens a [`channel::ChannelPair`] per contact over a
//! [`Transport`], routes the foreground conversation through
//! [`active_tab::ActiveTabState`] and tears channels down through the
//! [`shutdown::ShutdownCoordinator`]. Background loops report to the
//! caller through a bounded [`SessionEvent`] channel.

pub mod active_tab;
pub mod channel;
pub mod history;
pub mod presence;
pub mod shutdown;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc};

use pairchat_proto::presence::Presence;
use pairchat_proto::sample::ChatSample;
use pairchat_proto::topic::{TopicId, TopicPair};
use pairchat_proto::username::{NameError, validate_contact, validate_username};

use crate::transport::{Transport, TransportError};

use active_tab::ActiveTabState;
use channel::{
    ChannelContext, ChannelPair, ChannelSettings, ConversationEnd, InputSource, OutboundControl,
};
use history::HistoryLog;
use shutdown::ShutdownCoordinator;

/// Errors returned by [`SessionRegistry`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The name breaks the username rules.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    /// The contact is already registered.
    #[error("{0} is already a contact")]
    DuplicateContact(String),

    /// No contact with that name is registered.
    #[error("no contact named {0}")]
    NotFound(String),

    /// The contact's topics clash with a registered contact's topics or
    /// with a topic still being torn down.
    #[error("topic {topic} of {contact} is already in use")]
    TopicConflict {
        /// Contact that was being added.
        contact: String,
        /// The clashing topic.
        topic: TopicId,
    },

    /// The transport refused to create a channel.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[from] TransportError),

    /// The peer was offline when a line was sent. Recoverable.
    #[error("{0} is offline")]
    PeerUnreachable(String),

    /// The channel loops of a contact did not exit in time.
    #[error("channels of {contact} still running after {waited:?}")]
    DrainTimeout {
        /// Contact whose channels are stuck.
        contact: String,
        /// How long the drain waited.
        waited: Duration,
    },

    /// Another conversation is already in the foreground.
    #[error("already in a conversation with {0}")]
    ConversationBusy(String),

    /// The outbound loop of the contact has exited.
    #[error("channel to {0} is closed")]
    ChannelClosed(String),
}

/// Notifications emitted by background channel loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A line arrived from the contact in the foreground.
    Echo {
        /// Sender of the line.
        contact: String,
        /// The delivered sample.
        sample: ChatSample,
        /// `"<sender> (<timestamp>): <text>"`.
        line: String,
    },
    /// A line was discarded because the peer is offline.
    PeerUnreachable {
        /// The offline contact.
        contact: String,
    },
    /// A channel loop hit a non-recoverable transport failure and exited.
    ChannelFailed {
        /// Contact owning the channel.
        contact: String,
        /// Topic of the failed channel.
        topic: TopicId,
        /// Rendered error.
        reason: String,
    },
}

/// Timing and buffering for a [`SessionRegistry`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Tick of every channel loop, and the bound on one input wait.
    pub poll_interval: Duration,
    /// How long `remove` and `shutdown` wait for loops to exit.
    pub drain_timeout: Duration,
    /// Capacity of the [`SessionEvent`] channel.
    pub event_buffer: usize,
    /// chrono format string used to stamp lines.
    pub timestamp_format: String,
}

/// Format of `date`-style stamps, e.g. `Mon Oct 19 14:03:27 2026`.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(5),
            event_buffer: 256,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl ConversationEnd {
    /// Converts the end of a conversation into a result, so callers can
    /// surface an unreachable peer with `?`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::PeerUnreachable`] or
    /// [`SessionError::ChannelClosed`] naming `contact`.
    pub fn check(self, contact: &str) -> Result<(), SessionError> {
        match self {
            Self::Left => Ok(()),
            Self::PeerUnreachable => Err(SessionError::PeerUnreachable(contact.to_string())),
            Self::ChannelClosed => Err(SessionError::ChannelClosed(contact.to_string())),
        }
    }
}

/// Leaves the foreground when a conversation ends, even if the waiting
/// future is dropped.
struct ConversationGuard<'a> {
    tab: &'a ActiveTabState,
    control: Arc<OutboundControl>,
    contact: &'a str,
}

impl Drop for ConversationGuard<'_> {
    fn drop(&mut self) {
        self.control.deactivate(ConversationEnd::Left);
        self.tab.leave(self.contact);
    }
}

/// Owns every contact of one local user and their channel pairs.
pub struct SessionRegistry<T: Transport> {
    ctx: ChannelContext<T>,
    drain_timeout: Duration,
    sessions: RwLock<BTreeMap<String, ChannelPair>>,
    lifecycle: Mutex<()>,
}

impl<T: Transport> SessionRegistry<T> {
    /// Creates an empty registry for `local_user` and the receiver for its
    /// events.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidName`] if `local_user` breaks the
    /// username rules.
    pub fn new(
        local_user: &str,
        transport: Arc<T>,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), SessionError> {
        validate_username(local_user)?;
        let (events, rx) = mpsc::channel(config.event_buffer.max(1));
        tracing::info!(
            user = local_user,
            transport = %transport.transport_type(),
            "session registry created"
        );
        let registry = Self {
            ctx: ChannelContext {
                local_user: local_user.to_string(),
                transport,
                active_tab: Arc::new(ActiveTabState::new()),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                events,
                settings: ChannelSettings {
                    poll_interval: config.poll_interval,
                    timestamp_format: config.timestamp_format,
                },
            },
            drain_timeout: config.drain_timeout,
            sessions: RwLock::new(BTreeMap::new()),
            lifecycle: Mutex::new(()),
        };
        Ok((registry, rx))
    }

    /// Name of the local user.
    #[must_use]
    pub fn local_user(&self) -> &str {
        &self.ctx.local_user
    }

    /// Interval every channel loop ticks at.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.ctx.settings.poll_interval
    }

    /// Foreground routing state shared with the inbound loops.
    #[must_use]
    pub fn active_tab(&self) -> &ActiveTabState {
        &self.ctx.active_tab
    }

    /// Registers `contact` and starts its channel pair.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidName`] if the name is malformed, reserved or
    ///   the local user's own
    /// - [`SessionError::DuplicateContact`] if it is already registered
    /// - [`SessionError::TopicConflict`] if its topics collide with another
    ///   contact's or with a topic pending termination
    /// - [`SessionError::TransportUnavailable`] if a channel cannot be
    ///   created; nothing is left registered in that case
    pub async fn add(&self, contact: &str) -> Result<(), SessionError> {
        validate_contact(&self.ctx.local_user, contact)?;
        let _lifecycle = self.lifecycle.lock().await;

        if self.sessions.read().contains_key(contact) {
            return Err(SessionError::DuplicateContact(contact.to_string()));
        }
        self.check_topics_free(contact)?;
        let pair = ChannelPair::open(&self.ctx, contact).map_err(|e| {
            tracing::error!(contact, error = %e, "could not open channels");
            e
        })?;
        let topics = pair.topics().clone();
        self.sessions.write().insert(contact.to_string(), pair);
        tracing::info!(
            contact,
            outbound = %topics.outbound,
            inbound = %topics.inbound,
            "contact added"
        );
        Ok(())
    }

    /// Rejects `contact` if one of its topics is already claimed. A shared
    /// topic would match the local writer with the local reader, and tearing
    /// one contact down would stop the other's loop.
    fn check_topics_free(&self, contact: &str) -> Result<(), SessionError> {
        let wanted = TopicPair::new(&self.ctx.local_user, contact);
        let conflict = |topic: &TopicId| SessionError::TopicConflict {
            contact: contact.to_string(),
            topic: topic.clone(),
        };

        for (other, pair) in self.sessions.read().iter() {
            if let Some(topic) = wanted.overlap(pair.topics()) {
                tracing::warn!(contact, other = %other, %topic, "topic already in use");
                return Err(conflict(topic));
            }
        }
        if let Some(topic) = [&wanted.outbound, &wanted.inbound]
            .into_iter()
            .find(|topic| self.ctx.shutdown.is_pending(topic))
        {
            tracing::warn!(contact, %topic, "topic still pending termination");
            return Err(conflict(topic));
        }
        Ok(())
    }

    /// Stops both loops of `contact`, releases its channels and forgets it.
    ///
    /// Once this returns `Ok`, nothing is appended to the contact's history
    /// again.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if the contact is not registered
    /// - [`SessionError::DrainTimeout`] if a loop did not exit in time; the
    ///   contact stays registered and a later `remove` retries
    pub async fn remove(&self, contact: &str) -> Result<(), SessionError> {
        let _lifecycle = self.lifecycle.lock().await;

        let Some(mut pair) = self.sessions.write().remove(contact) else {
            return Err(SessionError::NotFound(contact.to_string()));
        };
        let topics = pair.topics().clone();
        self.ctx.shutdown.request_termination(topics.to_vec());

        if let Err(e) = self
            .ctx
            .shutdown
            .await_drained(pair.tasks_mut(), self.drain_timeout)
            .await
        {
            tracing::warn!(contact, error = %e, "contact kept, termination still pending");
            self.sessions.write().insert(contact.to_string(), pair);
            return Err(SessionError::DrainTimeout {
                contact: contact.to_string(),
                waited: e.waited,
            });
        }

        pair.release(self.ctx.transport.as_ref());
        self.ctx
            .shutdown
            .clear_topics([&topics.outbound, &topics.inbound]);
        tracing::info!(contact, "contact removed");
        Ok(())
    }

    /// Snapshot of every contact and its presence, ordered by name.
    #[must_use]
    pub fn list(&self) -> Vec<(String, Presence)> {
        self.sessions
            .read()
            .iter()
            .map(|(contact, pair)| (contact.clone(), pair.presence()))
            .collect()
    }

    /// Number of registered contacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no contact is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Presence of one contact.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the contact is not registered.
    pub fn presence_of(&self, contact: &str) -> Result<Presence, SessionError> {
        self.sessions
            .read()
            .get(contact)
            .map(ChannelPair::presence)
            .ok_or_else(|| SessionError::NotFound(contact.to_string()))
    }

    /// Shared handle to the history of one contact.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the contact is not registered.
    pub fn history_of(&self, contact: &str) -> Result<HistoryLog, SessionError> {
        self.sessions
            .read()
            .get(contact)
            .map(|pair| pair.history().clone())
            .ok_or_else(|| SessionError::NotFound(contact.to_string()))
    }

    /// Copy of the history of one contact.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the contact is not registered.
    pub fn history_snapshot(&self, contact: &str) -> Result<Vec<String>, SessionError> {
        self.history_of(contact).map(|history| history.snapshot())
    }

    /// Brings the conversation with `contact` to the foreground and hands
    /// it `input`. Resolves once the conversation ends.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if the contact is not registered
    /// - [`SessionError::ConversationBusy`] if another conversation is open
    /// - [`SessionError::ChannelClosed`] if the outbound loop has exited
    pub async fn enter_conversation(
        &self,
        contact: &str,
        input: InputSource,
    ) -> Result<ConversationEnd, SessionError> {
        let control = self
            .sessions
            .read()
            .get(contact)
            .map(ChannelPair::control)
            .ok_or_else(|| SessionError::NotFound(contact.to_string()))?;

        self.ctx
            .active_tab
            .enter(contact)
            .map_err(|busy| SessionError::ConversationBusy(busy.0))?;
        let guard = ConversationGuard {
            tab: &self.ctx.active_tab,
            control: Arc::clone(&control),
            contact,
        };

        let mut mode = control.subscribe();
        if !control.activate(input) {
            return Err(SessionError::ChannelClosed(contact.to_string()));
        }
        tracing::info!(contact, "conversation started");

        let ended = mode
            .wait_for(|mode| *mode != channel::SendMode::Active)
            .await
            .is_ok();
        drop(guard);

        let end = if ended {
            control.last_end()
        } else {
            ConversationEnd::ChannelClosed
        };
        tracing::info!(contact, ?end, "conversation ended");
        Ok(end)
    }

    /// Stops every channel loop and empties the registry.
    ///
    /// All loops share one `drain_timeout` deadline.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DrainTimeout`] naming the first contact whose
    /// loops did not exit. Every stuck contact stays registered.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let _lifecycle = self.lifecycle.lock().await;

        let sessions = std::mem::take(&mut *self.sessions.write());
        if sessions.is_empty() {
            return Ok(());
        }
        tracing::info!(contacts = sessions.len(), "shutting down all sessions");
        self.ctx
            .shutdown
            .request_termination(sessions.values().flat_map(|pair| pair.topics().to_vec()));

        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        let mut stuck = None;
        for (contact, mut pair) in sessions {
            let budget = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.ctx.shutdown.await_drained(pair.tasks_mut(), budget).await {
                Ok(()) => {
                    let topics = pair.topics().clone();
                    pair.release(self.ctx.transport.as_ref());
                    self.ctx
                        .shutdown
                        .clear_topics([&topics.outbound, &topics.inbound]);
                }
                Err(e) => {
                    tracing::warn!(contact, error = %e, "contact kept after shutdown");
                    stuck.get_or_insert_with(|| SessionError::DrainTimeout {
                        contact: contact.clone(),
                        waited: self.drain_timeout,
                    });
                    self.sessions.write().insert(contact, pair);
                }
            }
        }

        match stuck {
            Some(err) => Err(err),
            None => {
                self.ctx.shutdown.clear();
                tracing::info!("all sessions shut down");
                Ok(())
            }
        }
    }
}

impl<T: Transport> Drop for SessionRegistry<T> {
    fn drop(&mut self) {
        let sessions = self.sessions.get_mut();
        if sessions.is_empty() {
            return;
        }
        tracing::warn!(
            contacts = sessions.len(),
            "registry dropped without shutdown, loops asked to exit"
        );
        self.ctx
            .shutdown
            .request_termination(sessions.values().flat_map(|pair| pair.topics().to_vec()));
    }
}
