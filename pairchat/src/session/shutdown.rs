//! Cooperative termination of channel loops.
//!
//! Loops are never cancelled from outside. Instead the registry lists
//! their topics in the pending-termination set, every loop checks the set
//! once per tick and returns when it finds its own topic, and the
//! registry joins the loop tasks before releasing any transport handle.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;

use pairchat_proto::topic::TopicId;

/// Some loops were still running when the drain deadline passed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} loop(s) still running after {waited:?}", .remaining.len())]
pub struct DrainTimedOut {
    /// How long the drain waited.
    pub waited: Duration,
    /// Topics whose loops had not exited.
    pub remaining: Vec<TopicId>,
}

/// A spawned channel loop and the topic it serves.
#[derive(Debug)]
pub struct LoopTask {
    topic: TopicId,
    handle: Option<JoinHandle<()>>,
}

impl LoopTask {
    /// Spawns `run` on the current tokio runtime.
    pub fn spawn<F>(topic: TopicId, run: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            topic,
            handle: Some(tokio::spawn(run)),
        }
    }

    /// Topic served by this loop.
    #[must_use]
    pub const fn topic(&self) -> &TopicId {
        &self.topic
    }

    /// Returns `true` once the loop has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the loop to return. Safe to call again after a timeout.
    async fn join(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.await {
                tracing::error!(topic = %self.topic, error = %e, "channel loop panicked");
            }
            self.handle = None;
        }
    }
}

/// Process-wide set of topics whose loops must exit.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    pending: RwLock<HashSet<TopicId>>,
}

impl ShutdownCoordinator {
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `topics` to the pending-termination set.
    pub fn request_termination<I>(&self, topics: I)
    where
        I: IntoIterator<Item = TopicId>,
    {
        let mut pending = self.pending.write();
        for topic in topics {
            tracing::debug!(%topic, "termination requested");
            pending.insert(topic);
        }
    }

    /// Per-tick check made by every loop.
    #[must_use]
    pub fn is_pending(&self, topic: &TopicId) -> bool {
        self.pending.read().contains(topic)
    }

    /// Sorted copy of the pending set.
    #[must_use]
    pub fn pending(&self) -> Vec<TopicId> {
        let mut topics: Vec<_> = self.pending.read().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Joins every task, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DrainTimedOut`] listing the loops that had not exited.
    /// Tasks that did exit are marked joined, so the same tasks can be
    /// drained again later.
    pub async fn await_drained<'a, I>(&self, tasks: I, timeout: Duration) -> Result<(), DrainTimedOut>
    where
        I: IntoIterator<Item = &'a mut LoopTask>,
    {
        let mut tasks: Vec<&'a mut LoopTask> = tasks.into_iter().collect();
        let joined = tokio::time::timeout(timeout, async {
            for task in &mut tasks {
                task.join().await;
            }
        })
        .await;

        if joined.is_ok() {
            return Ok(());
        }
        let remaining: Vec<TopicId> = tasks
            .iter()
            .filter(|task| !task.is_finished())
            .map(|task| task.topic().clone())
            .collect();
        tracing::warn!(?remaining, ?timeout, "drain timed out");
        Err(DrainTimedOut {
            waited: timeout,
            remaining,
        })
    }

    /// Removes only `topics` from the set, leaving other pending
    /// terminations in place.
    pub fn clear_topics<'a, I>(&self, topics: I)
    where
        I: IntoIterator<Item = &'a TopicId>,
    {
        let mut pending = self.pending.write();
        for topic in topics {
            pending.remove(topic);
        }
    }

    /// Empties the set. Call only once every listed loop has been joined.
    pub fn clear(&self) {
        self.pending.write().clear();
    }
}
