//! Job lifecycle states and the transition rules between them.
//!
//! `queued -> running -> {succeeded, failed, cancelled}`, plus
//! `queued -> cancelled` for a plan cancelled before a worker picks it up.
//! Terminal states have no outgoing transitions.
//!
//! The store does not enforce these rules; the job runner and the plan
//! service consult [`JobState::can_transition`] before writing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Execution state of a plan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Terminal states: succeeded, failed, cancelled.
pub const TERMINAL_STATES: [JobState; 3] =
    [JobState::Succeeded, JobState::Failed, JobState::Cancelled];

impl JobState {
    /// Stable lowercase name, used for persistence and the plan status mirror.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        TERMINAL_STATES.contains(&self)
    }

    /// Returns the set of states reachable from `self`.
    pub fn valid_transitions(self) -> &'static [JobState] {
        match self {
            JobState::Queued => &[JobState::Running, JobState::Cancelled],
            JobState::Running => &[JobState::Succeeded, JobState::Failed, JobState::Cancelled],
            JobState::Succeeded | JobState::Failed | JobState::Cancelled => &[],
        }
    }

    /// Check whether moving from `self` to `to` is allowed.
    ///
    /// Staying in `running` is allowed so stage updates can be written
    /// without a state change.
    pub fn can_transition(self, to: JobState) -> bool {
        (self == JobState::Running && to == JobState::Running)
            || self.valid_transitions().contains(&to)
    }

    /// Validate a transition, returning a descriptive error for invalid ones.
    pub fn validate_transition(self, to: JobState) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Invalid job transition: {self} -> {to}"
            )))
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(CoreError::Validation(format!("Unknown job state: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn queued_to_running() {
        assert!(JobState::Queued.can_transition(JobState::Running));
    }

    #[test]
    fn queued_to_cancelled() {
        assert!(JobState::Queued.can_transition(JobState::Cancelled));
    }

    #[test]
    fn running_to_each_terminal() {
        for to in TERMINAL_STATES {
            assert!(JobState::Running.can_transition(to), "running -> {to}");
        }
    }

    #[test]
    fn running_stays_running() {
        assert!(JobState::Running.can_transition(JobState::Running));
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn queued_cannot_finish_directly() {
        assert!(!JobState::Queued.can_transition(JobState::Succeeded));
        assert!(!JobState::Queued.can_transition(JobState::Failed));
    }

    #[test]
    fn terminal_states_are_final() {
        for from in TERMINAL_STATES {
            assert!(from.valid_transitions().is_empty());
            assert!(!from.can_transition(JobState::Running));
            assert!(!from.can_transition(JobState::Queued));
        }
    }

    #[test]
    fn validate_transition_reports_names() {
        let err = JobState::Succeeded
            .validate_transition(JobState::Running)
            .unwrap_err();
        assert_matches!(err, CoreError::Conflict(ref msg) if msg.contains("succeeded -> running"));
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn parse_round_trips_names() {
        for state in [
            JobState::Queued,
            JobState::Running,
            JobState::Succeeded,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_matches!("paused".parse::<JobState>(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&JobState::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
    }
}
