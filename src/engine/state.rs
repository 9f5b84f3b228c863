use crate::model::WorkOrderState;

use super::EngineError;

/// Legal lifecycle: Scheduled → InProgress → Completed, with Cancelled
/// reachable from either non-terminal state. Terminal states accept nothing.
pub fn transition_allowed(from: WorkOrderState, to: WorkOrderState) -> bool {
    use WorkOrderState::*;
    matches!(
        (from, to),
        (Scheduled, InProgress) | (InProgress, Completed) | (Scheduled, Cancelled) | (InProgress, Cancelled)
    )
}

pub fn check_transition(from: WorkOrderState, to: WorkOrderState) -> Result<(), EngineError> {
    if transition_allowed(from, to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkOrderState::*;

    #[test]
    fn legal_transitions() {
        assert!(transition_allowed(Scheduled, InProgress));
        assert!(transition_allowed(InProgress, Completed));
        assert!(transition_allowed(Scheduled, Cancelled));
        assert!(transition_allowed(InProgress, Cancelled));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for to in [Scheduled, InProgress, Completed, Cancelled] {
            assert!(!transition_allowed(Completed, to));
            assert!(!transition_allowed(Cancelled, to));
        }
    }

    #[test]
    fn no_skipping_in_progress() {
        assert!(!transition_allowed(Scheduled, Completed));
    }

    #[test]
    fn no_self_transition() {
        assert!(!transition_allowed(Scheduled, Scheduled));
        assert!(!transition_allowed(InProgress, InProgress));
    }

    #[test]
    fn check_transition_reports_pair() {
        let err = check_transition(Completed, Scheduled).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidTransition {
                from: Completed,
                to: Scheduled
            }
        );
    }
}
