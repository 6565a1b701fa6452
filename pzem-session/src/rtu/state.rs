//! Serial session state machine

use crate::error::{PzemError, PzemResult};

/// Serial session state
///
/// # State Transitions
/// ```text
/// Closed  -> Open    (on open())
/// Open    -> Closed  (on close())
/// Open    -> Faulted (on an OS-level I/O error)
/// Faulted -> Closed  (on close())
/// ```
///
/// A faulted session refuses further exchanges until it is closed and
/// opened again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No serial handle is held
    #[default]
    Closed,
    /// The handle is open and exchanges may run
    Open,
    /// The handle failed at OS level; only close is allowed
    Faulted,
}

impl SessionState {
    /// Check if the session can run a request/response exchange
    pub fn can_exchange(&self) -> bool {
        matches!(self, SessionState::Open)
    }

    /// Validate state transition
    pub fn validate_transition(&self, new_state: SessionState) -> PzemResult<()> {
        let valid = matches!(
            (*self, new_state),
            (SessionState::Closed, SessionState::Open)
                | (SessionState::Open, SessionState::Closed)
                | (SessionState::Open, SessionState::Faulted)
                | (SessionState::Faulted, SessionState::Closed)
                | (SessionState::Closed, SessionState::Closed)
                | (SessionState::Faulted, SessionState::Faulted)
        );

        if valid {
            Ok(())
        } else {
            Err(PzemError::Validation(format!(
                "Invalid session state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Closed => "Closed",
            SessionState::Open => "Open",
            SessionState::Faulted => "Faulted",
        }
    }
}
