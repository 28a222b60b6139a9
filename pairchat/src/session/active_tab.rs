//! Foreground conversation tracking.
//!
//! At most one contact is "active" at a time. Inbound channels consult
//! this state on every delivery to decide whether the line is echoed live
//! or only recorded in history.

use parking_lot::RwLock;

/// Which conversation, if any, is in the foreground.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActiveTab {
    /// No conversation is open.
    #[default]
    Idle,
    /// The conversation with this contact is open.
    Active(String),
}

/// Another conversation is already in the foreground.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("already chatting with {0}")]
pub struct TabBusy(pub String);

/// Shared `Idle -> Active(contact) -> Idle` state machine.
#[derive(Debug, Default)]
pub struct ActiveTabState {
    tab: RwLock<ActiveTab>,
}

impl ActiveTabState {
    /// Creates an idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves from `Idle` to `Active(contact)`.
    ///
    /// # Errors
    ///
    /// Returns [`TabBusy`] naming the current contact if a conversation is
    /// already active.
    pub fn enter(&self, contact: &str) -> Result<(), TabBusy> {
        let mut tab = self.tab.write();
        if let ActiveTab::Active(current) = &*tab {
            return Err(TabBusy(current.clone()));
        }
        *tab = ActiveTab::Active(contact.to_string());
        Ok(())
    }

    /// Moves back to `Idle` if `contact` is the active conversation.
    ///
    /// Returns `false` and leaves the state untouched otherwise.
    pub fn leave(&self, contact: &str) -> bool {
        let mut tab = self.tab.write();
        if matches!(&*tab, ActiveTab::Active(current) if current == contact) {
            *tab = ActiveTab::Idle;
            true
        } else {
            false
        }
    }

    /// Returns `true` if `contact` is the active conversation.
    #[must_use]
    pub fn is_active_for(&self, contact: &str) -> bool {
        matches!(&*self.tab.read(), ActiveTab::Active(current) if current == contact)
    }

    /// Copies the current state.
    #[must_use]
    pub fn current(&self) -> ActiveTab {
        self.tab.read().clone()
    }
}
