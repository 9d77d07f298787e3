//! Per-stage run record.

use super::StageRunStatus;
use crate::errors::{InvalidTransitionError, StageFailureKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The record of one stage's execution within a pipeline run.
///
/// A `StageRun` only moves `pending -> running -> {completed | failed}`.
/// Once terminal it is immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRun {
    /// The stage id from the registry.
    pub stage_id: String,

    /// Current status.
    #[serde(default)]
    pub status: StageRunStatus,

    /// When the provider call started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the stage reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Opaque provider output (completed stages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error message (failed stages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failure classification (failed stages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<StageFailureKind>,

    /// Digest of the request payload the stage ran with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_digest: Option<String>,
}

impl StageRun {
    /// Creates a pending stage run.
    #[must_use]
    pub fn pending(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            status: StageRunStatus::Pending,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            failure_kind: None,
            context_digest: None,
        }
    }

    /// Moves the run to `running`.
    pub fn start(&mut self) -> Result<(), InvalidTransitionError> {
        self.transition(StageRunStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Moves the run to `completed` with the provider's data.
    pub fn complete(&mut self, data: serde_json::Value) -> Result<(), InvalidTransitionError> {
        self.transition(StageRunStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        self.result = Some(data);
        Ok(())
    }

    /// Moves the run to `failed`.
    pub fn fail(
        &mut self,
        kind: StageFailureKind,
        message: impl Into<String>,
    ) -> Result<(), InvalidTransitionError> {
        self.transition(StageRunStatus::Failed)?;
        self.completed_at = Some(Utc::now());
        self.error = Some(message.into());
        self.failure_kind = Some(kind);
        Ok(())
    }

    /// Records the digest of the payload this stage was given.
    #[must_use]
    pub fn with_context_digest(mut self, digest: impl Into<String>) -> Self {
        self.context_digest = Some(digest.into());
        self
    }

    fn transition(&mut self, next: StageRunStatus) -> Result<(), InvalidTransitionError> {
        let allowed = matches!(
            (self.status, next),
            (StageRunStatus::Pending, StageRunStatus::Running)
                | (StageRunStatus::Running, StageRunStatus::Completed)
                | (StageRunStatus::Running, StageRunStatus::Failed)
        );
        if !allowed {
            return Err(InvalidTransitionError::new(&self.stage_id, self.status, next));
        }
        self.status = next;
        Ok(())
    }

    /// Returns true if the stage completed with a result.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == StageRunStatus::Completed
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == StageRunStatus::Failed
    }

    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the elapsed seconds between start and completion, if both are known.
    #[must_use]
    pub fn elapsed_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                let millis = (end - start).num_milliseconds().max(0);
                #[allow(clippy::cast_precision_loss)]
                Some(millis as f64 / 1000.0)
            }
            _ => None,
        }
    }
}
