//! Step outcome state machine
//!
//! `Pending -> Running -> {Succeeded | Failed | Skipped}`, plus
//! `Pending -> Skipped` when a precondition is unmet. Terminal states have
//! no outgoing transitions.

use crate::error::TransitionError;
use crate::result::StepState;

/// Validates a state transition.
pub fn validate_transition(from: StepState, to: StepState) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::Illegal { from, to })
    }
}

/// States reachable from `from` in one transition
#[must_use]
pub fn allowed_transitions(from: StepState) -> &'static [StepState] {
    use StepState::*;
    match from {
        Pending => &[Running, Skipped],
        Running => &[Succeeded, Failed, Skipped],
        Succeeded | Failed | Skipped => &[],
    }
}
