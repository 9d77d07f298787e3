//! Read-only progress projection of pipeline runs.

use crate::core::{ControllerState, PipelineStatus, StageRunStatus};
use crate::errors::StageFailureKind;
use crate::pipeline::PipelineRun;
use crate::registry::StageRegistry;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Status of one stage as shown to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    /// Stage id.
    pub stage_id: String,
    /// Display name from the registry.
    pub display_name: String,
    /// Current status.
    pub status: StageRunStatus,
    /// Failure classification for failed stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<StageFailureKind>,
}

/// Snapshot of a run's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressView {
    /// Entity key.
    pub entity_key: String,
    /// The run this view describes.
    pub run_id: Uuid,
    /// Index of the executing stage.
    pub current_stage_index: Option<usize>,
    /// Id of the executing stage.
    pub current_stage_id: Option<String>,
    /// Every stage in registry order.
    pub stage_statuses: Vec<StageProgress>,
    /// Consumer-facing status.
    pub overall_status: PipelineStatus,
    /// Controller state machine position.
    pub controller_state: ControllerState,
    /// Completed stages.
    pub completed_count: usize,
    /// Failed stages.
    pub failed_count: usize,
    /// Nominal seconds left for the stages that are not terminal.
    pub estimated_remaining_seconds: f64,
}

impl ProgressView {
    /// Projects a run onto a view.
    #[must_use]
    pub fn from_run(run: &PipelineRun, registry: &StageRegistry) -> Self {
        let stage_statuses = run
            .stages
            .iter()
            .map(|stage_run| StageProgress {
                stage_id: stage_run.stage_id.clone(),
                display_name: registry
                    .by_id(&stage_run.stage_id)
                    .map_or_else(|_| stage_run.stage_id.clone(), |def| def.display_name.clone()),
                status: stage_run.status,
                failure_kind: stage_run.failure_kind,
            })
            .collect();

        let estimated_remaining_seconds = if run.state.is_terminal() {
            0.0
        } else {
            run.stages
                .iter()
                .filter(|stage_run| !stage_run.is_terminal())
                .filter_map(|stage_run| {
                    let nominal = registry.by_id(&stage_run.stage_id).ok()?.nominal_duration_seconds;
                    let spent = stage_run.started_at.map_or(0.0, |started| {
                        #[allow(clippy::cast_precision_loss)]
                        let millis = (Utc::now() - started).num_milliseconds().max(0) as f64;
                        millis / 1000.0
                    });
                    Some((nominal - spent).max(0.0))
                })
                .sum()
        };

        Self {
            entity_key: run.entity_key.clone(),
            run_id: run.run_id,
            current_stage_index: run.current_index,
            current_stage_id: run
                .current_index
                .and_then(|index| run.stages.get(index))
                .map(|stage_run| stage_run.stage_id.clone()),
            stage_statuses,
            overall_status: run.overall_status(),
            controller_state: run.state,
            completed_count: run.completed_count(),
            failed_count: run.failed_count(),
            estimated_remaining_seconds,
        }
    }

    /// Returns true once the run has stopped.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.controller_state.is_terminal()
    }

    /// Returns the status of a stage.
    #[must_use]
    pub fn stage_status(&self, stage_id: &str) -> Option<StageRunStatus> {
        self.stage_statuses
            .iter()
            .find(|stage| stage.stage_id == stage_id)
            .map(|stage| stage.status)
    }
}

/// Publishes and serves [`ProgressView`]s per entity key.
///
/// The latest view survives across runs, so a subscriber created before a
/// run starts sees every update of that run.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    channels: Arc<DashMap<String, watch::Sender<Option<ProgressView>>>>,
}

impl ProgressReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the latest view for an entity.
    #[must_use]
    pub fn status(&self, entity_key: &str) -> Option<ProgressView> {
        self.channels
            .get(entity_key)
            .and_then(|sender| sender.borrow().clone())
    }

    /// Subscribes to view updates for an entity.
    #[must_use]
    pub fn subscribe(&self, entity_key: &str) -> watch::Receiver<Option<ProgressView>> {
        self.channels
            .entry(entity_key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Drops the channel for an entity. Existing receivers observe closure.
    pub(crate) fn remove(&self, entity_key: &str) -> bool {
        self.channels.remove(entity_key).is_some()
    }

    pub(crate) fn publish(&self, view: ProgressView) {
        let key = view.entity_key.clone();
        self.channels
            .entry(key)
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(view));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageRun;
    use pretty_assertions::assert_eq;

    fn run() -> PipelineRun {
        PipelineRun::new(Uuid::new_v4(), "acme-corp", &StageRegistry::standard())
    }

    #[test]
    fn test_view_of_fresh_run() {
        let view = ProgressView::from_run(&run(), &StageRegistry::standard());

        assert_eq!(view.overall_status, PipelineStatus::Idle);
        assert_eq!(view.stage_statuses.len(), 6);
        assert_eq!(view.stage_statuses[2].display_name, "Media & Sentiment");
        assert!((view.estimated_remaining_seconds - 300.0).abs() < 1e-6);
        assert_eq!(view.current_stage_id, None);
    }

    #[test]
    fn test_view_tracks_current_stage_and_counts() {
        let registry = StageRegistry::standard();
        let mut run = run();
        run.transition(ControllerState::Checking).unwrap();
        run.transition(ControllerState::Running).unwrap();

        let mut market = StageRun::pending("market");
        market.start().unwrap();
        market.complete(serde_json::json!({})).unwrap();
        run.record(0, market).unwrap();
        run.begin_stage(1).unwrap();

        let view = ProgressView::from_run(&run, &registry);
        assert_eq!(view.current_stage_index, Some(1));
        assert_eq!(view.current_stage_id.as_deref(), Some("competitive"));
        assert_eq!(view.completed_count, 1);
        assert_eq!(view.stage_status("market"), Some(StageRunStatus::Completed));
        assert_eq!(view.overall_status, PipelineStatus::Running);
        assert!(view.estimated_remaining_seconds <= 255.0);
    }

    #[test]
    fn test_terminal_run_has_nothing_remaining() {
        let mut run = run();
        run.mark_aborted();
        let view = ProgressView::from_run(&run, &StageRegistry::standard());

        assert!(view.is_terminal());
        assert_eq!(view.overall_status, PipelineStatus::Failed);
        assert!(view.estimated_remaining_seconds.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_subscriber_sees_published_views() {
        let reporter = ProgressReporter::new();
        let mut rx = reporter.subscribe("acme-corp");
        assert!(rx.borrow().is_none());
        assert!(reporter.status("acme-corp").is_none());

        reporter.publish(ProgressView::from_run(&run(), &StageRegistry::standard()));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().entity_key, "acme-corp");
        assert!(reporter.status("acme-corp").is_some());
        assert!(reporter.status("globex").is_none());
    }
}
