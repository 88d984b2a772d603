//! The processing status state machine shared by every message kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The processing status of a message.
///
/// Status only moves forward: `NotInitialized -> Processing -> {Rejected |
/// Completed | Failed}`. Terminal states never change within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// The context has been created but not yet entered a pipeline.
    #[default]
    NotInitialized,
    /// The message is travelling through the chain.
    Processing,
    /// Validation, locating or resolving refused the message.
    Rejected,
    /// The handler ran (events: all handlers were attempted).
    Completed,
    /// The handler raised an error.
    Failed,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "not_initialized"),
            Self::Processing => write!(f, "processing"),
            Self::Rejected => write!(f, "rejected"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl ProcessingStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Failed)
    }

    /// Returns the numeric status code used in persisted records.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::NotInitialized => 0,
            Self::Processing => 1,
            Self::Rejected => 2,
            Self::Completed => 3,
            Self::Failed => 4,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::NotInitialized => 0,
            Self::Processing => 1,
            Self::Rejected | Self::Completed | Self::Failed => 2,
        }
    }

    /// Returns true if moving to `next` keeps the status moving forward.
    ///
    /// Setting the same status again is always allowed.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ProcessingStatus::Completed.to_string(), "completed");
        assert_eq!(ProcessingStatus::NotInitialized.to_string(), "not_initialized");
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(ProcessingStatus::Rejected.is_terminal());
        assert!(ProcessingStatus::Completed.is_terminal());
        assert!(ProcessingStatus::Failed.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
        assert!(!ProcessingStatus::NotInitialized.is_terminal());
    }

    #[test]
    fn test_forward_only_transitions() {
        use ProcessingStatus::*;

        assert!(NotInitialized.can_transition_to(Processing));
        assert!(NotInitialized.can_transition_to(Rejected));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Completed));

        assert!(!Processing.can_transition_to(NotInitialized));
        assert!(!Rejected.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ProcessingStatus::NotInitialized.code(), 0);
        assert_eq!(ProcessingStatus::Failed.code(), 4);
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&ProcessingStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
    }
}
