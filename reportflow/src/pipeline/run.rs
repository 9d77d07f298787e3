//! Per-entity pipeline run state.

use crate::core::{ControllerState, PipelineStatus, StageRun};
use crate::errors::{InvalidTransitionError, StageNotFoundError};
use crate::registry::StageRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One execution of the stage catalog for an entity.
///
/// Owned by its controller task; readers get snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// The entity the run belongs to.
    pub entity_key: String,
    /// One record per registry stage, in registry order.
    pub stages: Vec<StageRun>,
    /// Controller state machine position.
    pub state: ControllerState,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Index of the stage being executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_index: Option<usize>,
    /// Index of the first stage this run executes.
    #[serde(default)]
    pub resumed_from: usize,
}

impl PipelineRun {
    /// Creates an idle run with every stage pending.
    #[must_use]
    pub fn new(run_id: Uuid, entity_key: impl Into<String>, registry: &StageRegistry) -> Self {
        Self {
            run_id,
            entity_key: entity_key.into(),
            stages: registry
                .stages()
                .iter()
                .map(|stage| StageRun::pending(&stage.id))
                .collect(),
            state: ControllerState::Idle,
            created_at: Utc::now(),
            finished_at: None,
            current_index: None,
            resumed_from: 0,
        }
    }

    /// Consumer-facing status.
    #[must_use]
    pub fn overall_status(&self) -> PipelineStatus {
        self.state.overall_status()
    }

    /// Moves the controller state machine.
    pub fn transition(&mut self, next: ControllerState) -> Result<(), InvalidTransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransitionError::new(
                format!("pipeline:{}", self.entity_key),
                self.state,
                next,
            ));
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
            self.current_index = None;
        }
        Ok(())
    }

    /// Forces the run into `Aborted` regardless of its current state.
    pub fn mark_aborted(&mut self) {
        self.state = ControllerState::Aborted;
        self.finished_at = Some(Utc::now());
        self.current_index = None;
    }

    /// Adopts the leading persisted completed records and returns the resume
    /// index: the first stage without a persisted completed record.
    ///
    /// Records after the resume index are ignored; those stages re-execute.
    pub fn adopt(&mut self, persisted: Vec<StageRun>) -> usize {
        let mut resume_from = 0;
        for slot in &mut self.stages {
            let Some(record) = persisted
                .iter()
                .find(|r| r.stage_id == slot.stage_id && r.is_completed())
            else {
                break;
            };
            *slot = record.clone();
            resume_from += 1;
        }
        self.resumed_from = resume_from;
        resume_from
    }

    /// Marks the stage at `index` as running.
    pub fn begin_stage(&mut self, index: usize) -> Result<(), InvalidTransitionError> {
        let stage_id = self.stage_id_at(index);
        let slot = self
            .stages
            .get_mut(index)
            .ok_or_else(|| InvalidTransitionError::new(stage_id, "missing", "running"))?;
        slot.start()?;
        self.current_index = Some(index);
        Ok(())
    }

    /// Records the terminal run of the stage at `index`.
    pub fn record(&mut self, index: usize, stage_run: StageRun) -> Result<(), StageNotFoundError> {
        let slot = self
            .stages
            .get_mut(index)
            .filter(|slot| slot.stage_id == stage_run.stage_id)
            .ok_or_else(|| StageNotFoundError::new(stage_run.stage_id.clone()))?;
        *slot = stage_run;
        Ok(())
    }

    /// Resets an abandoned stage back to pending.
    pub fn abandon_stage(&mut self, index: usize) {
        if let Some(slot) = self.stages.get_mut(index) {
            *slot = StageRun::pending(slot.stage_id.clone());
        }
    }

    /// Returns the record for a stage id.
    #[must_use]
    pub fn stage(&self, stage_id: &str) -> Option<&StageRun> {
        self.stages.iter().find(|run| run.stage_id == stage_id)
    }

    /// Number of completed stages.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.stages.iter().filter(|run| run.is_completed()).count()
    }

    /// Number of failed stages.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|run| run.is_failed()).count()
    }

    fn stage_id_at(&self, index: usize) -> String {
        self.stages
            .get(index)
            .map_or_else(|| format!("#{index}"), |run| run.stage_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageRunStatus;
    use crate::errors::StageFailureKind;
    use pretty_assertions::assert_eq;

    fn completed(stage_id: &str) -> StageRun {
        let mut run = StageRun::pending(stage_id);
        run.start().unwrap();
        run.complete(serde_json::json!({"stage": stage_id})).unwrap();
        run
    }

    fn new_run() -> PipelineRun {
        PipelineRun::new(Uuid::new_v4(), "acme-corp", &StageRegistry::standard())
    }

    #[test]
    fn test_new_run_is_idle_and_pending() {
        let run = new_run();
        assert_eq!(run.state, ControllerState::Idle);
        assert_eq!(run.overall_status(), PipelineStatus::Idle);
        assert_eq!(run.stages.len(), 6);
        assert!(run.stages.iter().all(|s| s.status == StageRunStatus::Pending));
    }

    #[test]
    fn test_adopt_stops_at_first_gap() {
        let mut run = new_run();
        let mut failed = StageRun::pending("media");
        failed.start().unwrap();
        failed.fail(StageFailureKind::Timeout, "slow").unwrap();

        let resume = run.adopt(vec![
            completed("market"),
            completed("competitive"),
            failed,
            completed("regulatory"),
        ]);

        assert_eq!(resume, 2);
        assert_eq!(run.resumed_from, 2);
        assert_eq!(run.completed_count(), 2);
        assert_eq!(run.stage("media").unwrap().status, StageRunStatus::Pending);
        assert_eq!(run.stage("regulatory").unwrap().status, StageRunStatus::Pending);
    }

    #[test]
    fn test_adopt_everything() {
        let mut run = new_run();
        let all: Vec<_> = StageRegistry::standard()
            .stages()
            .iter()
            .map(|s| completed(&s.id))
            .collect();
        assert_eq!(run.adopt(all), 6);
    }

    #[test]
    fn test_transitions_follow_state_machine() {
        let mut run = new_run();
        run.transition(ControllerState::Checking).unwrap();
        run.transition(ControllerState::Running).unwrap();
        run.begin_stage(0).unwrap();
        assert_eq!(run.current_index, Some(0));

        run.transition(ControllerState::Cancelled).unwrap();
        assert!(run.finished_at.is_some());
        assert_eq!(run.current_index, None);

        let err = run.transition(ControllerState::Running).unwrap_err();
        assert_eq!(err.from, "cancelled");
    }

    #[test]
    fn test_record_rejects_wrong_stage() {
        let mut run = new_run();
        assert!(run.record(0, completed("competitive")).is_err());
        run.record(0, completed("market")).unwrap();
        assert_eq!(run.completed_count(), 1);
    }

    #[test]
    fn test_abandon_resets_stage() {
        let mut run = new_run();
        run.begin_stage(2).unwrap();
        run.abandon_stage(2);
        assert_eq!(run.stages[2].status, StageRunStatus::Pending);
        assert_eq!(run.failed_count(), 0);
    }
}
