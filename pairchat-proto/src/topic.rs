//! Deterministic topic naming for one-to-one conversations.
//!
//! A conversation between `alice` and `bob` uses two topics:
//! `alice_bob` carries alice's messages and `bob_alice` carries bob's.
//! Each side's outbound topic is the other side's inbound topic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator placed between the writer and reader usernames.
pub const TOPIC_SEPARATOR: char = '_';

/// Name of one direction of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicId(String);

impl TopicId {
    /// Creates a topic identifier from a raw name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Topic on which `local` publishes to `contact`.
    #[must_use]
    pub fn outbound(local: &str, contact: &str) -> Self {
        Self(format!("{local}{TOPIC_SEPARATOR}{contact}"))
    }

    /// Topic on which `local` receives from `contact`.
    #[must_use]
    pub fn inbound(local: &str, contact: &str) -> Self {
        Self::outbound(contact, local)
    }

    /// Returns the string form of this topic.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The outbound and inbound topics of one conversation, seen from `local`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPair {
    /// Topic this side writes to.
    pub outbound: TopicId,
    /// Topic this side reads from.
    pub inbound: TopicId,
}

impl TopicPair {
    /// Derives both topics for a conversation between `local` and `contact`.
    #[must_use]
    pub fn new(local: &str, contact: &str) -> Self {
        Self {
            outbound: TopicId::outbound(local, contact),
            inbound: TopicId::inbound(local, contact),
        }
    }

    /// Returns the same conversation as seen from the other side.
    #[must_use]
    pub fn mirrored(&self) -> Self {
        Self {
            outbound: self.inbound.clone(),
            inbound: self.outbound.clone(),
        }
    }

    /// Both topics, outbound first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<TopicId> {
        vec![self.outbound.clone(), self.inbound.clone()]
    }

    /// Returns `true` if `topic` is either direction of this pair.
    #[must_use]
    pub fn contains(&self, topic: &TopicId) -> bool {
        self.outbound == *topic || self.inbound == *topic
    }

    /// The first topic of this pair that `other` also uses, if any.
    ///
    /// Usernames may contain the separator, so two different contacts can
    /// derive the same topic name: `abc` talking to `q_abc` writes on
    /// `abc_q_abc`, which is where `abc_q` writes to `abc`.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> Option<&TopicId> {
        [&self.outbound, &self.inbound]
            .into_iter()
            .find(|topic| other.contains(topic))
    }
}
