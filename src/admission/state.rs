//! Admission state machine.
//!
//! ```text
//! NotStarted ──start──▶ Accepting ◀──resume── Paused
//!                           │                   ▲
//!                           └───────pause───────┘
//! any ──begin_shutdown──▶ ShuttingDown (terminal)
//! ```
//!
//! Transitions report whether they changed anything, so the controller
//! registers or deregisters listeners exactly once per real transition.

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    NotStarted,
    Accepting,
    Paused,
    ShuttingDown,
}

impl AdmissionState {
    /// Listener sockets are serviced in this state only.
    pub fn is_accepting(&self) -> bool {
        matches!(self, AdmissionState::Accepting)
    }

    /// `NotStarted → Accepting`.
    pub fn start(&mut self) -> bool {
        self.transition(AdmissionState::NotStarted, AdmissionState::Accepting)
    }

    /// `Accepting → Paused`; a no-op in any other state.
    pub fn pause(&mut self) -> bool {
        self.transition(AdmissionState::Accepting, AdmissionState::Paused)
    }

    /// `Paused → Accepting`; a no-op in any other state.
    pub fn resume(&mut self) -> bool {
        self.transition(AdmissionState::Paused, AdmissionState::Accepting)
    }

    /// Any state `→ ShuttingDown`. Returns false if already shutting down.
    pub fn begin_shutdown(&mut self) -> bool {
        if *self == AdmissionState::ShuttingDown {
            return false;
        }
        *self = AdmissionState::ShuttingDown;
        true
    }

    fn transition(&mut self, from: AdmissionState, to: AdmissionState) -> bool {
        if *self == from {
            *self = to;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Display for AdmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AdmissionState::NotStarted => "not-started",
            AdmissionState::Accepting => "accepting",
            AdmissionState::Paused => "paused",
            AdmissionState::ShuttingDown => "shutting-down",
        };
        f.write_str(name)
    }
}
