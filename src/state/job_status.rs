/// Job status definitions shared by every job kind
///
/// This module defines the states a job can be in and the single transition
/// rule between them.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Represents the current state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    // ===== Active States =====
    /// Job has been created and is in flight
    Started,

    // ===== Terminal States =====
    /// Job ran to its natural end
    Completed,

    /// Job was cancelled by a stop request
    Stopped,

    /// Job failed before or while running
    Error,
}

/// Rejected status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobStatus {
    /// Returns true if this is a terminal state (no further transitions)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Checks whether `self -> to` is allowed
    ///
    /// Only `Started` may move, and only to a terminal state.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(self, Self::Started) && to.is_terminal()
    }

    /// Applies a transition, returning the new status
    pub fn transition(self, to: JobStatus) -> Result<JobStatus, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "STARTED" => Some(Self::Started),
            "COMPLETED" => Some(Self::Completed),
            "STOPPED" => Some(Self::Stopped),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_states() -> Vec<Self> {
        vec![Self::Started, Self::Completed, Self::Stopped, Self::Error]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
