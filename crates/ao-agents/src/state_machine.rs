use serde::{Deserialize, Serialize};
use std::fmt;

use ao_core::types::AgentStatus;

// ---------------------------------------------------------------------------
// StatusEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    /// A unit of work (analysis or step) succeeded.
    Work,
    /// A unit of work failed.
    Fail,
    /// The task is done.
    Finish,
    Stop,
    Restart,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusEvent::Work => "work",
            StatusEvent::Fail => "fail",
            StatusEvent::Finish => "finish",
            StatusEvent::Stop => "stop",
            StatusEvent::Restart => "restart",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid transition: cannot apply {event} to an agent in status {status}")]
    InvalidTransition {
        status: AgentStatus,
        event: StatusEvent,
    },
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Status reached by applying `event` in `status`.
///
/// - Idle    + Work    -> Working
/// - Working + Work    -> Working
/// - Idle | Working | Error + Fail -> Error
/// - Working + Finish  -> Completed
/// - any but Stopped   + Stop -> Stopped
/// - any     + Restart -> Idle
pub fn next_status(status: AgentStatus, event: StatusEvent) -> Result<AgentStatus, TransitionError> {
    use AgentStatus::*;

    let next = match (status, event) {
        (Idle | Working, StatusEvent::Work) => Working,
        (Idle | Working | Error, StatusEvent::Fail) => Error,
        (Working, StatusEvent::Finish) => Completed,
        (Idle | Working | Error | Completed, StatusEvent::Stop) => Stopped,
        (_, StatusEvent::Restart) => Idle,
        _ => return Err(TransitionError::InvalidTransition { status, event }),
    };
    Ok(next)
}

pub fn can_transition(status: AgentStatus, event: StatusEvent) -> bool {
    next_status(status, event).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_is_accepted_everywhere() {
        for status in [
            AgentStatus::Idle,
            AgentStatus::Working,
            AgentStatus::Error,
            AgentStatus::Completed,
            AgentStatus::Stopped,
        ] {
            assert_eq!(next_status(status, StatusEvent::Restart), Ok(AgentStatus::Idle));
        }
    }

    #[test]
    fn error_message_names_both_sides() {
        let err = next_status(AgentStatus::Idle, StatusEvent::Finish).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid transition: cannot apply finish to an agent in status idle"
        );
    }
}
