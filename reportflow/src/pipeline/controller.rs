//! The per-run state machine.

use super::PipelineRun;
use crate::cancellation::CancellationToken;
use crate::context::ContextAccumulator;
use crate::core::{ControllerState, EntityProfile};
use crate::errors::ReportflowError;
use crate::events::{types, EventSink, PipelineEvent};
use crate::executor::{StageExecution, StageExecutor};
use crate::persistence::PersistenceAdapter;
use crate::progress::{ProgressReporter, ProgressView};
use crate::registry::StageRegistry;
use crate::synthesis::{SynthesisEngine, SynthesisReport};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Invoked with the report of every completed run for a key.
pub type CompletionCallback = Arc<dyn Fn(&SynthesisReport) + Send + Sync>;

/// Everything a controller needs, shared by all runs of an orchestrator.
pub(crate) struct RunServices {
    pub(crate) registry: Arc<StageRegistry>,
    pub(crate) executor: StageExecutor,
    pub(crate) persistence: Arc<dyn PersistenceAdapter>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) synthesis: SynthesisEngine,
    pub(crate) reporter: ProgressReporter,
    pub(crate) reports: DashMap<String, Arc<SynthesisReport>>,
    pub(crate) callbacks: DashMap<String, Vec<CompletionCallback>>,
}

impl RunServices {
    pub(crate) fn publish(&self, run: &PipelineRun) {
        self.reporter.publish(ProgressView::from_run(run, &self.registry));
    }
}

/// Drives one [`PipelineRun`] from `Checking` to a terminal state.
pub(crate) struct RunController {
    services: Arc<RunServices>,
    profile: EntityProfile,
    run: Arc<RwLock<PipelineRun>>,
    cancel: Arc<CancellationToken>,
    entity_key: String,
    run_id: Uuid,
}

impl RunController {
    pub(crate) fn new(
        services: Arc<RunServices>,
        profile: EntityProfile,
        run: Arc<RwLock<PipelineRun>>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        let (entity_key, run_id) = {
            let guard = run.read();
            (guard.entity_key.clone(), guard.run_id)
        };
        Self {
            services,
            profile,
            run,
            cancel,
            entity_key,
            run_id,
        }
    }

    /// Runs to completion and returns the terminal state.
    pub(crate) async fn drive(self) -> ControllerState {
        match self.drive_stages().await {
            Ok(state) => state,
            Err(e) => {
                error!(
                    entity_key = %self.entity_key,
                    run_id = %self.run_id,
                    error = %e,
                    "Pipeline run aborted"
                );
                {
                    let mut run = self.run.write();
                    run.mark_aborted();
                    self.services.publish(&run);
                }
                self.emit(
                    PipelineEvent::new(types::PIPELINE_ABORTED, &self.entity_key, self.run_id)
                        .with_data(json!({"error": e.to_dict()})),
                )
                .await;
                ControllerState::Aborted
            }
        }
    }

    async fn drive_stages(&self) -> Result<ControllerState, ReportflowError> {
        let registry = self.services.registry.clone();
        self.emit(
            PipelineEvent::new(types::PIPELINE_STARTED, &self.entity_key, self.run_id)
                .with_data(json!({"stages": registry.len()})),
        )
        .await;
        info!(entity_key = %self.entity_key, run_id = %self.run_id, "Pipeline run started");

        let persisted = match self.services.persistence.get_stage_runs(&self.entity_key).await {
            Ok(runs) => runs,
            Err(e) => {
                warn!(
                    entity_key = %self.entity_key,
                    run_id = %self.run_id,
                    error = %e,
                    "Could not read persisted stage runs, starting from the first stage"
                );
                Vec::new()
            }
        };

        let (resume_from, adopted) = {
            let mut run = self.run.write();
            let resume_from = run.adopt(persisted);
            let adopted: Vec<String> = run
                .stages
                .iter()
                .take(resume_from)
                .map(|stage_run| stage_run.stage_id.clone())
                .collect();
            self.services.publish(&run);
            (resume_from, adopted)
        };
        if resume_from > 0 {
            info!(
                entity_key = %self.entity_key,
                run_id = %self.run_id,
                resumed_from = resume_from,
                "Resuming from persisted stage runs"
            );
            self.emit(
                PipelineEvent::new(types::PIPELINE_RESUMED, &self.entity_key, self.run_id)
                    .with_data(json!({"resumed_from": resume_from, "adopted": adopted})),
            )
            .await;
        }

        if self.cancel.is_cancelled() {
            return self.finish_cancelled().await;
        }
        if resume_from == registry.len() {
            return self.finish_completed().await;
        }

        self.update(|run| run.transition(ControllerState::Running))?;

        for (index, stage) in registry.stages().iter().enumerate().skip(resume_from) {
            if self.cancel.is_cancelled() {
                return self.finish_cancelled().await;
            }

            let payload = self.update(|run| {
                run.begin_stage(index)?;
                ContextAccumulator::build_for_index(&self.profile, &registry, &run.stages, index)
                    .map_err(ReportflowError::from)
            })?;

            let execution = self
                .services
                .executor
                .execute(&self.entity_key, self.run_id, stage, &payload, &self.cancel)
                .await?;

            match execution {
                StageExecution::Finished(stage_run) => {
                    self.update(|run| run.record(index, stage_run))?;
                }
                StageExecution::Cancelled => {
                    self.update(|run| {
                        run.abandon_stage(index);
                        Ok::<_, ReportflowError>(())
                    })?;
                    return self.finish_cancelled().await;
                }
            }
        }

        self.finish_completed().await
    }

    async fn finish_completed(&self) -> Result<ControllerState, ReportflowError> {
        let stages = self.run.read().stages.clone();
        let report = Arc::new(self.services.synthesis.synthesize(&self.profile, &stages));
        self.services
            .reports
            .insert(self.entity_key.clone(), report.clone());

        {
            let mut run = self.run.write();
            run.transition(ControllerState::Completed)?;
        }

        let callbacks: Vec<CompletionCallback> = self
            .services
            .callbacks
            .get(&self.entity_key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        for callback in callbacks {
            callback(&report);
        }

        info!(
            entity_key = %self.entity_key,
            run_id = %self.run_id,
            stages_completed = report.metadata.stages_completed,
            stages_failed = report.metadata.stages_failed,
            duration_seconds = report.metadata.duration_seconds,
            "Pipeline run completed"
        );
        self.emit(
            PipelineEvent::new(types::PIPELINE_COMPLETED, &self.entity_key, self.run_id).with_data(
                json!({
                    "stages_completed": report.metadata.stages_completed,
                    "stages_failed": report.metadata.stages_failed,
                    "placeholder_sections": report.placeholder_sections(),
                }),
            ),
        )
        .await;

        self.services.publish(&self.run.read());
        Ok(ControllerState::Completed)
    }

    async fn finish_cancelled(&self) -> Result<ControllerState, ReportflowError> {
        self.update(|run| run.transition(ControllerState::Cancelled))?;

        let reason = self.cancel.reason().unwrap_or_default();
        info!(
            entity_key = %self.entity_key,
            run_id = %self.run_id,
            reason = %reason,
            "Pipeline run cancelled"
        );
        self.emit(
            PipelineEvent::new(types::PIPELINE_CANCELLED, &self.entity_key, self.run_id)
                .with_data(json!({"reason": reason})),
        )
        .await;
        Ok(ControllerState::Cancelled)
    }

    /// Mutates the run under its lock and publishes the new view.
    fn update<T, E>(&self, f: impl FnOnce(&mut PipelineRun) -> Result<T, E>) -> Result<T, ReportflowError>
    where
        ReportflowError: From<E>,
    {
        let mut run = self.run.write();
        let value = f(&mut run)?;
        self.services.publish(&run);
        Ok(value)
    }

    async fn emit(&self, event: PipelineEvent) {
        self.services.events.emit(event).await;
    }
}
