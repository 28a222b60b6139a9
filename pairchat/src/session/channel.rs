//! Per-contact channel pair: one outbound and one inbound loop.
//!
//! The outbound loop idles until a conversation hands it an input source,
//! then reads lines, stamps them, appends them to history and publishes
//! them. The inbound loop records every delivered sample in the same
//! history and echoes it when its contact is in the foreground. Both loops
//! poll the [`ShutdownCoordinator`] once per tick and return when their
//! topic is listed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::MissedTickBehavior;

use pairchat_proto::presence::Presence;
use pairchat_proto::sample::ChatSample;
use pairchat_proto::topic::{TopicId, TopicPair};

use crate::transport::{InboundHandle, OutboundHandle, SampleCallback, Transport, TransportError};

use super::SessionEvent;
use super::active_tab::ActiveTabState;
use super::history::HistoryLog;
use super::presence::PresenceTracker;
use super::shutdown::{LoopTask, ShutdownCoordinator};

/// Line that ends the current conversation instead of being sent.
pub const LEAVE_COMMAND: &str = "/exit";

/// Source of lines typed by the foreground user.
///
/// The same source is shared between the menu and whichever conversation
/// is active; only the holder of the lock reads from it.
pub type InputSource = Arc<Mutex<mpsc::Receiver<String>>>;

/// Mode of an outbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// No conversation is attached.
    Idle,
    /// A conversation is attached and lines are being read.
    Active,
    /// The loop has exited. Terminal.
    Closed,
}

/// Why an outbound channel left [`SendMode::Active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEnd {
    /// The user typed [`LEAVE_COMMAND`] or closed the input.
    Left,
    /// The peer was offline, so the pending line was discarded.
    PeerUnreachable,
    /// The channel loop exited while the conversation was open.
    ChannelClosed,
}

/// Timing and formatting shared by every channel of a registry.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Interval between termination checks.
    pub poll_interval: Duration,
    /// chrono format string for stamped lines.
    pub timestamp_format: String,
}

impl ChannelSettings {
    fn now(&self) -> String {
        Local::now().format(&self.timestamp_format).to_string()
    }
}

/// Handoff point between a conversation and its outbound loop.
#[derive(Debug)]
pub(crate) struct OutboundControl {
    mode: watch::Sender<SendMode>,
    input: parking_lot::Mutex<Option<InputSource>>,
    end: parking_lot::Mutex<ConversationEnd>,
}

impl OutboundControl {
    fn new() -> Self {
        let (mode, _) = watch::channel(SendMode::Idle);
        Self {
            mode,
            input: parking_lot::Mutex::new(None),
            end: parking_lot::Mutex::new(ConversationEnd::Left),
        }
    }

    pub(crate) fn mode(&self) -> SendMode {
        *self.mode.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SendMode> {
        self.mode.subscribe()
    }

    pub(crate) fn last_end(&self) -> ConversationEnd {
        *self.end.lock()
    }

    /// `Idle -> Active`. Returns `false` from any other mode.
    pub(crate) fn activate(&self, input: InputSource) -> bool {
        let mut input = Some(input);
        self.mode.send_if_modified(|mode| {
            if *mode != SendMode::Idle {
                return false;
            }
            *self.input.lock() = input.take();
            *self.end.lock() = ConversationEnd::Left;
            *mode = SendMode::Active;
            true
        })
    }

    /// `Active -> Idle`, recording why.
    pub(crate) fn deactivate(&self, end: ConversationEnd) {
        self.mode.send_if_modified(|mode| {
            if *mode != SendMode::Active {
                return false;
            }
            self.input.lock().take();
            *self.end.lock() = end;
            *mode = SendMode::Idle;
            true
        });
    }

    /// Any mode `-> Closed`.
    fn close(&self) {
        self.mode.send_if_modified(|mode| {
            if *mode == SendMode::Closed {
                return false;
            }
            if *mode == SendMode::Active {
                *self.end.lock() = ConversationEnd::ChannelClosed;
            }
            self.input.lock().take();
            *mode = SendMode::Closed;
            true
        });
    }

    fn input(&self) -> Option<InputSource> {
        self.input.lock().clone()
    }
}

/// Collaborators every channel of one registry shares.
pub(crate) struct ChannelContext<T: Transport> {
    pub(crate) local_user: String,
    pub(crate) transport: Arc<T>,
    pub(crate) active_tab: Arc<ActiveTabState>,
    pub(crate) shutdown: Arc<ShutdownCoordinator>,
    pub(crate) events: mpsc::Sender<SessionEvent>,
    pub(crate) settings: ChannelSettings,
}

/// Emits a session event without blocking. A full buffer drops the event.
fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(e) = events.try_send(event) {
        tracing::debug!(error = %e, "session event dropped");
    }
}

/// The outbound and inbound channels of one contact.
pub(crate) struct ChannelPair {
    topics: TopicPair,
    presence: Arc<PresenceTracker>,
    history: HistoryLog,
    control: Arc<OutboundControl>,
    outbound_handle: OutboundHandle,
    inbound_handle: InboundHandle,
    outbound_task: LoopTask,
    inbound_task: LoopTask,
}

impl ChannelPair {
    /// Creates both transport handles and starts both loops.
    ///
    /// If the inbound handle cannot be created the outbound handle is
    /// destroyed again, so a failed open leaves nothing behind.
    pub(crate) fn open<T: Transport>(
        ctx: &ChannelContext<T>,
        contact: &str,
    ) -> Result<Self, TransportError> {
        let topics = TopicPair::new(&ctx.local_user, contact);
        let presence = Arc::new(PresenceTracker::new(topics.outbound.clone()));
        let history = HistoryLog::new();
        let control = Arc::new(OutboundControl::new());

        let outbound_handle = ctx
            .transport
            .create_outbound(&topics.outbound, presence.callback())?;

        let (sample_tx, sample_rx) = mpsc::unbounded_channel();
        let on_sample: SampleCallback = Arc::new(move |sample: ChatSample| {
            // A closed receiver means the loop already exited.
            let _ = sample_tx.send(sample);
        });
        let inbound_handle = match ctx.transport.create_inbound(&topics.inbound, on_sample) {
            Ok(handle) => handle,
            Err(e) => {
                ctx.transport.destroy_outbound(&outbound_handle);
                return Err(e);
            }
        };

        let outbound = OutboundLoop {
            local_user: ctx.local_user.clone(),
            contact: contact.to_string(),
            topic: topics.outbound.clone(),
            transport: Arc::clone(&ctx.transport),
            handle: outbound_handle.clone(),
            presence: Arc::clone(&presence),
            history: history.clone(),
            control: Arc::clone(&control),
            shutdown: Arc::clone(&ctx.shutdown),
            events: ctx.events.clone(),
            settings: ctx.settings.clone(),
            next_index: 0,
        };
        let inbound = InboundLoop {
            contact: contact.to_string(),
            topic: topics.inbound.clone(),
            history: history.clone(),
            active_tab: Arc::clone(&ctx.active_tab),
            shutdown: Arc::clone(&ctx.shutdown),
            events: ctx.events.clone(),
            settings: ctx.settings.clone(),
            samples: sample_rx,
            last_delivered: None,
        };

        let outbound_task = LoopTask::spawn(topics.outbound.clone(), outbound.run());
        let inbound_task = LoopTask::spawn(topics.inbound.clone(), inbound.run());

        Ok(Self {
            topics,
            presence,
            history,
            control,
            outbound_handle,
            inbound_handle,
            outbound_task,
            inbound_task,
        })
    }

    pub(crate) const fn topics(&self) -> &TopicPair {
        &self.topics
    }

    pub(crate) fn presence(&self) -> Presence {
        self.presence.current()
    }

    pub(crate) const fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub(crate) fn control(&self) -> Arc<OutboundControl> {
        Arc::clone(&self.control)
    }

    /// Both loop tasks, for draining.
    pub(crate) fn tasks_mut(&mut self) -> [&mut LoopTask; 2] {
        [&mut self.outbound_task, &mut self.inbound_task]
    }

    /// Destroys both transport handles. Call only after the loops are drained.
    pub(crate) fn release<T: Transport>(self, transport: &T) {
        debug_assert!(self.outbound_task.is_finished() && self.inbound_task.is_finished());
        transport.destroy_outbound(&self.outbound_handle);
        transport.destroy_inbound(&self.inbound_handle);
    }
}

struct OutboundLoop<T: Transport> {
    local_user: String,
    contact: String,
    topic: TopicId,
    transport: Arc<T>,
    handle: OutboundHandle,
    presence: Arc<PresenceTracker>,
    history: HistoryLog,
    control: Arc<OutboundControl>,
    shutdown: Arc<ShutdownCoordinator>,
    events: mpsc::Sender<SessionEvent>,
    settings: ChannelSettings,
    next_index: u32,
}

impl<T: Transport> OutboundLoop<T> {
    async fn run(mut self) {
        tracing::debug!(topic = %self.topic, "outbound loop started");
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.shutdown.is_pending(&self.topic) {
                break;
            }
            if self.control.mode() != SendMode::Active {
                ticker.tick().await;
                continue;
            }
            if let Err(e) = self.step().await {
                tracing::error!(topic = %self.topic, error = %e, "publish failed, closing outbound channel");
                emit(
                    &self.events,
                    SessionEvent::ChannelFailed {
                        contact: self.contact.clone(),
                        topic: self.topic.clone(),
                        reason: e.to_string(),
                    },
                );
                break;
            }
        }

        self.control.close();
        tracing::debug!(topic = %self.topic, "outbound loop exited");
    }

    /// One pass in active mode. Waits at most one poll interval for input.
    async fn step(&mut self) -> Result<(), TransportError> {
        if !self.presence.is_online() {
            self.peer_unreachable();
            return Ok(());
        }
        let Some(input) = self.control.input() else {
            self.control.deactivate(ConversationEnd::Left);
            return Ok(());
        };

        let received = {
            let mut lines = input.lock().await;
            tokio::time::timeout(self.settings.poll_interval, lines.recv()).await
        };
        let line = match received {
            Err(_elapsed) => return Ok(()),
            Ok(None) => {
                tracing::debug!(topic = %self.topic, "input closed, leaving conversation");
                self.control.deactivate(ConversationEnd::Left);
                return Ok(());
            }
            Ok(Some(line)) => line,
        };

        let text = line.trim_end_matches(['\r', '\n']);
        if text == LEAVE_COMMAND {
            self.control.deactivate(ConversationEnd::Left);
            return Ok(());
        }
        if text.trim().is_empty() {
            return Ok(());
        }
        // The peer may have gone away while we were waiting for input.
        if !self.presence.is_online() {
            self.peer_unreachable();
            return Ok(());
        }

        self.next_index += 1;
        let sample = ChatSample::new(self.local_user.as_str(), text, self.next_index);
        let stamped = sample.render_stamped(&self.settings.now());

        // A line the transport rejected was never sent, so it stays out of
        // the history.
        let matched = self.transport.publish(&self.handle, &sample)?;
        self.history.append(stamped);
        if !matched {
            tracing::warn!(topic = %self.topic, index = sample.index, "no reader matched at publish time");
            self.peer_unreachable();
        }
        Ok(())
    }

    fn peer_unreachable(&self) {
        tracing::info!(contact = %self.contact, "peer offline, message discarded");
        emit(
            &self.events,
            SessionEvent::PeerUnreachable {
                contact: self.contact.clone(),
            },
        );
        self.control.deactivate(ConversationEnd::PeerUnreachable);
    }
}

struct InboundLoop {
    contact: String,
    topic: TopicId,
    history: HistoryLog,
    active_tab: Arc<ActiveTabState>,
    shutdown: Arc<ShutdownCoordinator>,
    events: mpsc::Sender<SessionEvent>,
    settings: ChannelSettings,
    samples: mpsc::UnboundedReceiver<ChatSample>,
    last_delivered: Option<String>,
}

impl InboundLoop {
    async fn run(mut self) {
        tracing::debug!(topic = %self.topic, "inbound loop started");
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.shutdown.is_pending(&self.topic) {
                        break;
                    }
                }
                received = self.samples.recv() => {
                    if let Some(sample) = received {
                        self.deliver(sample);
                    } else {
                        tracing::error!(topic = %self.topic, "reader dropped by transport, closing inbound channel");
                        emit(
                            &self.events,
                            SessionEvent::ChannelFailed {
                                contact: self.contact.clone(),
                                topic: self.topic.clone(),
                                reason: TransportError::Closed.to_string(),
                            },
                        );
                        break;
                    }
                }
            }
        }

        tracing::debug!(topic = %self.topic, "inbound loop exited");
    }

    fn deliver(&mut self, sample: ChatSample) {
        if !sample.is_deliverable() {
            tracing::trace!(topic = %self.topic, "ignoring sample with empty sender or text");
            return;
        }
        let line = sample.render();
        // The substrate may redeliver the last sample; only a change counts.
        if self.last_delivered.as_deref() == Some(line.as_str()) {
            tracing::debug!(topic = %self.topic, index = sample.index, "duplicate sample dropped");
            return;
        }

        self.history.append(line.clone());
        if self.active_tab.is_active_for(&self.contact) {
            let stamped = sample.render_stamped(&self.settings.now());
            emit(
                &self.events,
                SessionEvent::Echo {
                    contact: self.contact.clone(),
                    sample,
                    line: stamped,
                },
            );
        }
        self.last_delivered = Some(line);
    }
}
