//! Built-in peer that answers every message with an echo.
//!
//! An [`EchoPeer`] is a second [`SessionRegistry`] sharing the caller's
//! transport. It keeps one conversation open with its partner and replies
//! to each delivered line with `echo: <text>`, which makes it useful for
//! demos and end-to-end tests.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::channel::{ConversationEnd, InputSource};
use crate::session::{SessionConfig, SessionError, SessionEvent, SessionRegistry};
use crate::transport::Transport;

/// Prefix of every reply.
pub const ECHO_PREFIX: &str = "echo: ";

/// A peer that echoes whatever its partner sends.
pub struct EchoPeer<T: Transport> {
    registry: Arc<SessionRegistry<T>>,
    conversation: JoinHandle<()>,
    responder: JoinHandle<()>,
}

impl<T: Transport> EchoPeer<T> {
    /// Starts a peer named `name` that talks to `partner` over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if either name is invalid or the channels
    /// cannot be created.
    pub async fn spawn(
        name: &str,
        partner: &str,
        transport: Arc<T>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let (registry, events) = SessionRegistry::new(name, transport, config)?;
        registry.add(partner).await?;
        let registry = Arc::new(registry);

        let (replies, input) = mpsc::channel(64);
        let input = Arc::new(Mutex::new(input));

        let conversation = tokio::spawn(converse(
            Arc::clone(&registry),
            partner.to_string(),
            input,
        ));
        let responder = tokio::spawn(respond(events, replies));

        tracing::info!(peer = name, partner, "echo peer started");
        Ok(Self {
            registry,
            conversation,
            responder,
        })
    }

    /// Name the peer logged in as.
    #[must_use]
    pub fn name(&self) -> &str {
        self.registry.local_user()
    }

    /// Returns `true` while the conversation with `partner` is in the
    /// foreground, i.e. while lines from `partner` are being echoed.
    #[must_use]
    pub fn is_listening(&self, partner: &str) -> bool {
        self.registry.active_tab().is_active_for(partner)
    }

    /// Stops the peer and releases its channels.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DrainTimeout`] if its loops did not exit.
    pub async fn shutdown(self) -> Result<(), SessionError> {
        self.conversation.abort();
        self.responder.abort();
        self.registry.shutdown().await
    }
}

/// Keeps the conversation with `partner` in the foreground while the
/// partner is online, waiting out any offline stretch.
async fn converse<T: Transport>(
    registry: Arc<SessionRegistry<T>>,
    partner: String,
    input: InputSource,
) {
    let mut ticker = tokio::time::interval(registry.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        match registry.presence_of(&partner) {
            Ok(presence) if presence.is_online() => {}
            Ok(_) => {
                ticker.tick().await;
                continue;
            }
            Err(e) => {
                tracing::warn!(partner, error = %e, "echo partner gone");
                return;
            }
        }
        match registry
            .enter_conversation(&partner, Arc::clone(&input))
            .await
        {
            Ok(ConversationEnd::PeerUnreachable) => {
                tracing::debug!(partner, "echo partner went offline");
            }
            Ok(end) => {
                tracing::debug!(partner, ?end, "echo conversation finished");
                return;
            }
            Err(e) => {
                tracing::warn!(partner, error = %e, "echo conversation unavailable");
                return;
            }
        }
    }
}

/// Turns every echoed line into a reply.
async fn respond(mut events: mpsc::Receiver<SessionEvent>, replies: mpsc::Sender<String>) {
    while let Some(event) = events.recv().await {
        if let SessionEvent::Echo { sample, .. } = event {
            let reply = format!("{ECHO_PREFIX}{}", sample.message);
            if replies.send(reply).await.is_err() {
                break;
            }
        }
    }
}

impl<T: Transport> Drop for EchoPeer<T> {
    fn drop(&mut self) {
        self.conversation.abort();
        self.responder.abort();
    }
}
