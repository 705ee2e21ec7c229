//! Lifecycle - States an instance passes through during one operation

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Planned,
    Creating,
    Created,
    Reading,
    NotFound,
    Updating,
    Deleting,
    Deleted,
    /// Only an external identifier is known
    ExternalId,
    Importing,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Planned, Creating)
                | (Creating, Created)
                | (Created, Reading)
                | (Reading, Created)
                | (Reading, NotFound)
                | (Created, Updating)
                | (Updating, Created)
                | (Created, Deleting)
                | (Deleting, Deleted)
                | (ExternalId, Importing)
                | (Importing, Created)
                | (Importing, NotFound)
        )
    }

    /// Whether the instance is tracked once this state is reached
    pub fn is_tracked(self) -> bool {
        !matches!(
            self,
            LifecycleState::Planned
                | LifecycleState::NotFound
                | LifecycleState::Deleted
                | LifecycleState::ExternalId
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Tracks one instance through an operation, logging each step
#[derive(Debug)]
pub struct Lifecycle {
    address: String,
    state: LifecycleState,
}

impl Lifecycle {
    pub fn start(address: impl Into<String>, state: LifecycleState) -> Self {
        Self {
            address: address.into(),
            state,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn advance(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        log::debug!("{}: {} -> {}", self.address, self.state, next);
        self.state = next;
    }
}
