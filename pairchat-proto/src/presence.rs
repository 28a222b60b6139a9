//! Presence of a peer on a conversation topic.

use serde::{Deserialize, Serialize};

/// Whether the transport currently reports the peer's reader as matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presence {
    /// No matched reader on the outbound topic.
    #[default]
    Offline,
    /// The peer's reader is matched and can receive samples.
    Online,
}

impl Presence {
    /// Returns `true` for [`Presence::Online`].
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}
