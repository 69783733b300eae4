//! Trade mission state machine phases.

use serde::{Deserialize, Serialize};

/// The phases of one trade mission form.
///
/// Field entry moves between Empty, PartiallyFilled and Complete in any
/// order. Submit moves Complete → Reviewing, and the review buttons end in
/// one of the terminal phases. Discard is reachable from every non-terminal
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Empty,
    PartiallyFilled,
    Complete,
    Reviewing,
    Published,
    SavedOnly,
    Discarded,
}

impl WorkflowPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: WorkflowPhase) -> bool {
        use WorkflowPhase::*;
        if self.is_terminal() {
            return false;
        }
        match (self, target) {
            (_, Discarded) => true,
            (Empty | PartiallyFilled | Complete, Empty | PartiallyFilled | Complete) => true,
            (Complete, Reviewing) => true,
            (Reviewing, Published | SavedOnly) => true,
            _ => false,
        }
    }

    /// Whether this phase is terminal (the form is retired).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::SavedOnly | Self::Discarded)
    }

    /// Whether field-entry transitions are accepted in this phase.
    pub fn accepts_field_updates(&self) -> bool {
        matches!(self, Self::Empty | Self::PartiallyFilled | Self::Complete)
    }
}

impl Default for WorkflowPhase {
    fn default() -> Self {
        Self::Empty
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::PartiallyFilled => "partially_filled",
            Self::Complete => "complete",
            Self::Reviewing => "reviewing",
            Self::Published => "published",
            Self::SavedOnly => "saved_only",
            Self::Discarded => "discarded",
        };
        write!(f, "{s}")
    }
}
