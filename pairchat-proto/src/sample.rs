//! The chat sample exchanged on every conversation topic.
//!
//! A sample carries the sender's username, the message text and a
//! per-writer sequence number. Rendering helpers produce the exact line
//! formats stored in conversation history.

use serde::{Deserialize, Serialize};

/// Maximum allowed message text size in bytes (64 KB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// One message published on a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatSample {
    /// Username of the writer.
    pub username: String,
    /// Message text as typed by the writer.
    pub message: String,
    /// Per-writer sequence number, starting at 1 for the first publish.
    pub index: u32,
}

impl ChatSample {
    /// Creates a new sample.
    #[must_use]
    pub fn new(username: impl Into<String>, message: impl Into<String>, index: u32) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
            index,
        }
    }

    /// Returns `true` when both the sender and the text are non-empty.
    ///
    /// Samples failing this check are ignored by receivers.
    #[must_use]
    pub fn is_deliverable(&self) -> bool {
        !self.username.is_empty() && !self.message.is_empty()
    }

    /// Renders the history line for a received sample: `"<sender>: <text>"`.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}: {}", self.username, self.message)
    }

    /// Renders the sample with a timestamp: `"<sender> (<timestamp>): <text>"`.
    #[must_use]
    pub fn render_stamped(&self, timestamp: &str) -> String {
        render_stamped(&self.username, timestamp, &self.message)
    }
}

/// Renders a stamped line: `"<sender> (<timestamp>): <text>"`.
#[must_use]
pub fn render_stamped(sender: &str, timestamp: &str, text: &str) -> String {
    format!("{sender} ({timestamp}): {text}")
}
