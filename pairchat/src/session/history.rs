//! Append-only conversation history shared by both halves of a channel pair.

use std::sync::Arc;

use parking_lot::RwLock;

/// Ordered log of rendered lines for one contact.
///
/// Cloning a `HistoryLog` yields another handle to the same log. Each
/// [`append`](Self::append) is atomic. Lines are never reordered or
/// edited once written.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    lines: Arc<RwLock<Vec<String>>>,
}

impl HistoryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one rendered line.
    pub fn append(&self, line: impl Into<String>) {
        self.lines.write().push(line.into());
    }

    /// Copies the current contents in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.read().clone()
    }

    /// Number of lines appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.read().len()
    }

    /// Returns `true` if nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.read().is_empty()
    }
}
