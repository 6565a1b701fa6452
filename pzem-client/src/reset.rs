//! Energy reset procedure
//!
//! The device sometimes clears its counter without answering, or answers
//! with a garbled frame. A reset is therefore judged by reading the energy
//! register before and after, not by the reply alone.

use serde::Serialize;

/// Step of an energy reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResetPhase {
    Idle,
    ReadBefore,
    SendReset,
    AwaitResponse,
    Delay,
    ReadAfter,
    Verified,
    Unverified,
}

impl ResetPhase {
    /// Check if a transition to `next` is allowed
    pub fn can_advance(&self, next: ResetPhase) -> bool {
        use ResetPhase::*;
        matches!(
            (self, next),
            (Idle, ReadBefore)
                | (Idle, SendReset)
                | (ReadBefore, SendReset)
                | (SendReset, AwaitResponse)
                | (AwaitResponse, Delay)
                | (AwaitResponse, Unverified)
                | (Delay, ReadAfter)
                | (ReadAfter, Verified)
                | (ReadAfter, Unverified)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResetPhase::Verified | ResetPhase::Unverified)
    }
}

/// Result of an energy reset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResetOutcome {
    /// Energy went down or reads zero after the reset (Wh)
    Verified { before: f64, after: f64 },
    /// Reset was sent but the readings do not confirm it
    Unverified {
        before: Option<f64>,
        after: Option<f64>,
    },
    /// Reset was sent but energy could not be read back
    Failed(String),
}

impl ResetOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, ResetOutcome::Verified { .. })
    }
}

/// Judge a reset from energy readings taken around it
pub fn classify(before: Option<f64>, after: Option<f64>) -> ResetOutcome {
    match (before, after) {
        (Some(before), Some(after)) if after < before || after == 0.0 => {
            ResetOutcome::Verified { before, after }
        }
        _ => ResetOutcome::Unverified { before, after },
    }
}

/// Bookkeeping for one reset run
#[derive(Debug)]
pub(crate) struct ResetProcedure {
    phase: ResetPhase,
    before: Option<f64>,
}

impl ResetProcedure {
    pub fn new() -> Self {
        Self {
            phase: ResetPhase::Idle,
            before: None,
        }
    }

    pub fn phase(&self) -> ResetPhase {
        self.phase
    }

    pub fn before(&self) -> Option<f64> {
        self.before
    }

    pub fn record_before(&mut self, energy: f64) {
        self.before = Some(energy);
    }

    pub fn advance(&mut self, next: ResetPhase) {
        debug_assert!(
            self.phase.can_advance(next),
            "reset phase {:?} -> {:?}",
            self.phase,
            next
        );
        log::debug!("Energy reset: {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Close the run with the energy read after the reset
    pub fn finish(&mut self, after: Option<f64>) -> ResetOutcome {
        let outcome = classify(self.before, after);
        self.advance(if outcome.is_verified() {
            ResetPhase::Verified
        } else {
            ResetPhase::Unverified
        });
        outcome
    }

    /// Close the run when the energy could not be read back
    pub fn fail(&mut self, reason: String) -> ResetOutcome {
        self.advance(ResetPhase::Unverified);
        ResetOutcome::Failed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_energy_dropped() {
        assert_eq!(
            classify(Some(1500.0), Some(3.0)),
            ResetOutcome::Verified {
                before: 1500.0,
                after: 3.0
            }
        );
    }

    #[test]
    fn test_classify_small_counters() {
        assert!(!classify(Some(5.0), Some(5.0)).is_verified());
        assert!(classify(Some(5.0), Some(0.0)).is_verified());
        assert!(classify(Some(5.0), Some(2.0)).is_verified());
    }

    #[test]
    fn test_classify_zero_after() {
        assert!(classify(Some(0.0), Some(0.0)).is_verified());
    }

    #[test]
    fn test_classify_unchanged() {
        assert_eq!(
            classify(Some(1500.0), Some(1500.0)),
            ResetOutcome::Unverified {
                before: Some(1500.0),
                after: Some(1500.0)
            }
        );
    }

    #[test]
    fn test_classify_without_before() {
        assert!(!classify(None, Some(0.0)).is_verified());
        assert!(!classify(None, None).is_verified());
    }

    #[test]
    fn test_phase_transitions() {
        assert!(ResetPhase::Idle.can_advance(ResetPhase::ReadBefore));
        assert!(ResetPhase::Idle.can_advance(ResetPhase::SendReset));
        assert!(ResetPhase::AwaitResponse.can_advance(ResetPhase::Unverified));
        assert!(!ResetPhase::Idle.can_advance(ResetPhase::Verified));
        assert!(!ResetPhase::Verified.can_advance(ResetPhase::Idle));
        assert!(!ResetPhase::SendReset.can_advance(ResetPhase::ReadAfter));
    }

    #[test]
    fn test_procedure_full_run() {
        let mut procedure = ResetProcedure::new();
        procedure.advance(ResetPhase::ReadBefore);
        procedure.record_before(820.0);
        procedure.advance(ResetPhase::SendReset);
        procedure.advance(ResetPhase::AwaitResponse);
        procedure.advance(ResetPhase::Delay);
        procedure.advance(ResetPhase::ReadAfter);

        let outcome = procedure.finish(Some(0.0));
        assert!(outcome.is_verified());
        assert_eq!(procedure.phase(), ResetPhase::Verified);
        assert!(procedure.phase().is_terminal());
    }

    #[test]
    fn test_procedure_read_back_failure() {
        let mut procedure = ResetProcedure::new();
        procedure.advance(ResetPhase::ReadBefore);
        procedure.record_before(820.0);
        procedure.advance(ResetPhase::SendReset);
        procedure.advance(ResetPhase::AwaitResponse);
        procedure.advance(ResetPhase::Delay);
        procedure.advance(ResetPhase::ReadAfter);

        let outcome = procedure.fail("Timeout".to_string());
        assert_eq!(outcome, ResetOutcome::Failed("Timeout".to_string()));
        assert_eq!(procedure.phase(), ResetPhase::Unverified);
        assert_eq!(procedure.before(), Some(820.0));
    }
}
