//! Stage, pipeline and controller status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The status of a single stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRunStatus {
    /// Stage has not started.
    #[default]
    Pending,
    /// Stage is waiting on the analysis provider.
    Running,
    /// Stage finished with a result.
    Completed,
    /// Stage finished with an error.
    Failed,
}

impl fmt::Display for StageRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageRunStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The overall status of a pipeline run, as exposed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// No run has started.
    #[default]
    Idle,
    /// A run is checking persisted state or executing stages.
    Running,
    /// Every stage is terminal and the report has been synthesized.
    Completed,
    /// The run was aborted or cancelled before producing a report.
    Failed,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The state of the run controller's state machine.
///
/// `Completed`, `Aborted` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Created, not yet started.
    #[default]
    Idle,
    /// Reading persisted stage runs to find the resume point.
    Checking,
    /// Driving stages in order.
    Running,
    /// Report synthesized.
    Completed,
    /// The entity profile was unusable.
    Aborted,
    /// The run was cancelled externally.
    Cancelled,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Checking => write!(f, "checking"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl ControllerState {
    /// Returns true while the run holds the single-flight slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Checking | Self::Running)
    }

    /// Returns true if the state machine has stopped.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Cancelled)
    }

    /// Returns true if the state machine permits moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Checking)
                | (Self::Idle, Self::Aborted)
                | (Self::Checking, Self::Running)
                | (Self::Checking, Self::Completed)
                | (Self::Checking, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Aborted)
                | (Self::Running, Self::Cancelled)
        )
    }

    /// Projects the controller state onto the consumer-facing status.
    #[must_use]
    pub fn overall_status(&self) -> PipelineStatus {
        match self {
            Self::Idle => PipelineStatus::Idle,
            Self::Checking | Self::Running => PipelineStatus::Running,
            Self::Completed => PipelineStatus::Completed,
            Self::Aborted | Self::Cancelled => PipelineStatus::Failed,
        }
    }
}
