use std::fmt;

use serde::Serialize;

/// Lifecycle state of a [`MessageHandlingService`](super::MessageHandlingService).
///
/// ```text
/// Stopped --start()--> Starting --(sources started)--> Running
/// Running --stop()---> Stopping --(sources stopped)--> Stopped
/// ```
///
/// An all-or-nothing start that fails goes `Starting -> Stopped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl LifecycleState {
    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// `Starting` or `Stopping`.
    pub fn is_transitional(self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Stopping)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}
