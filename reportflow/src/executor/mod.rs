//! Runs one stage against the analysis provider.

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::context::RequestPayload;
use crate::core::StageRun;
use crate::errors::InvalidTransitionError;
use crate::events::{types, EventSink, PipelineEvent};
use crate::observability::StageTimer;
use crate::persistence::PersistenceAdapter;
use crate::provider::{AnalysisProvider, ProviderResult};
use crate::registry::StageDefinition;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The outcome of [`StageExecutor::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum StageExecution {
    /// The stage reached a terminal status and a save was attempted.
    Finished(StageRun),
    /// The run was cancelled while the provider call was in flight.
    Cancelled,
}

impl StageExecution {
    /// Returns the terminal stage run, if any.
    #[must_use]
    pub fn stage_run(&self) -> Option<&StageRun> {
        match self {
            Self::Finished(run) => Some(run),
            Self::Cancelled => None,
        }
    }
}

/// Drives a single provider call with a bounded budget.
///
/// There is no retry within a run: each call either completes or fails and the
/// terminal record is persisted once.
#[derive(Clone)]
pub struct StageExecutor {
    provider: Arc<dyn AnalysisProvider>,
    persistence: Arc<dyn PersistenceAdapter>,
    events: Arc<dyn EventSink>,
    config: PipelineConfig,
}

impl StageExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        persistence: Arc<dyn PersistenceAdapter>,
        events: Arc<dyn EventSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            provider,
            persistence,
            events,
            config,
        }
    }

    /// Returns the configuration the executor computes budgets from.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Executes `stage` with `payload`.
    ///
    /// Returns `Cancelled` without persisting anything if `cancel` fires while
    /// the provider call is pending.
    pub async fn execute(
        &self,
        entity_key: &str,
        run_id: Uuid,
        stage: &StageDefinition,
        payload: &RequestPayload,
        cancel: &CancellationToken,
    ) -> Result<StageExecution, InvalidTransitionError> {
        let mut stage_run = StageRun::pending(&stage.id).with_context_digest(payload.digest());
        stage_run.start()?;

        let budget = self.config.stage_timeout(stage.nominal_duration());
        let timeout_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self.events
            .emit(
                PipelineEvent::new(types::STAGE_STARTED, entity_key, run_id)
                    .with_stage(&stage.id)
                    .with_data(json!({
                        "timeout_ms": timeout_ms,
                        "context_stages": payload.context_stage_ids(),
                    })),
            )
            .await;
        debug!(
            entity_key,
            stage_id = %stage.id,
            %run_id,
            timeout_ms,
            "Invoking provider"
        );

        let timer = StageTimer::start(&stage.id);
        let call = tokio::time::timeout(budget, self.provider.invoke(stage, payload, budget));
        let result = match cancel.run_until_cancelled(call).await {
            None => {
                info!(
                    entity_key,
                    stage_id = %stage.id,
                    %run_id,
                    reason = cancel.reason().as_deref().unwrap_or(""),
                    "Stage abandoned by cancellation"
                );
                return Ok(StageExecution::Cancelled);
            }
            Some(Err(_elapsed)) => ProviderResult::timeout(budget),
            Some(Ok(result)) => result,
        };
        let duration_ms = timer.finish();

        let event = match result {
            ProviderResult::Success { data } => {
                stage_run.complete(data)?;
                info!(entity_key, stage_id = %stage.id, %run_id, duration_ms, "Stage completed");
                PipelineEvent::new(types::STAGE_COMPLETED, entity_key, run_id)
                    .with_stage(&stage.id)
                    .with_data(json!({"duration_ms": duration_ms}))
            }
            ProviderResult::Failure { kind, message } => {
                warn!(
                    entity_key,
                    stage_id = %stage.id,
                    %run_id,
                    duration_ms,
                    error_code = kind.error_code(),
                    error = %message,
                    "Stage failed"
                );
                stage_run.fail(kind, message)?;
                PipelineEvent::new(types::STAGE_FAILED, entity_key, run_id)
                    .with_stage(&stage.id)
                    .with_data(json!({
                        "duration_ms": duration_ms,
                        "error_code": kind.error_code(),
                    }))
            }
        };

        if let Err(e) = self
            .persistence
            .save_stage_run(entity_key, stage_run.clone())
            .await
        {
            warn!(
                entity_key,
                stage_id = %stage.id,
                %run_id,
                error = %e,
                "Failed to persist stage run"
            );
            self.events
                .emit(
                    PipelineEvent::new(types::STAGE_PERSIST_FAILED, entity_key, run_id)
                        .with_stage(&stage.id)
                        .with_data(json!({"operation": e.operation, "message": e.message})),
                )
                .await;
        }

        self.events.emit(event).await;
        Ok(StageExecution::Finished(stage_run))
    }
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextAccumulator;
    use crate::core::{EntityProfile, StageRunStatus};
    use crate::errors::{PersistenceError, StageFailureKind};
    use crate::events::CollectingEventSink;
    use crate::persistence::{InMemoryPersistence, MockPersistenceAdapter};
    use crate::testing::ScriptedProvider;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Harness {
        provider: Arc<ScriptedProvider>,
        persistence: Arc<InMemoryPersistence>,
        events: Arc<CollectingEventSink>,
        executor: StageExecutor,
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        let provider = Arc::new(provider);
        let persistence = Arc::new(InMemoryPersistence::new());
        let events = Arc::new(CollectingEventSink::new());
        let executor = StageExecutor::new(
            provider.clone(),
            persistence.clone(),
            events.clone(),
            PipelineConfig::default(),
        );
        Harness {
            provider,
            persistence,
            events,
            executor,
        }
    }

    fn stage(id: &str) -> StageDefinition {
        StageDefinition::new(id, id, "focus", 0.05)
    }

    fn payload(stage: &StageDefinition) -> RequestPayload {
        ContextAccumulator::build(&EntityProfile::new("Acme Corp", "software"), stage, &[])
    }

    #[tokio::test]
    async fn test_success_is_persisted() {
        let h = harness(
            ScriptedProvider::new().with_success("market", serde_json::json!({"summary": "ok"})),
        );
        let stage = stage("market");
        let payload = payload(&stage);

        let outcome = h
            .executor
            .execute("acme-corp", Uuid::new_v4(), &stage, &payload, &CancellationToken::new())
            .await
            .unwrap();

        let run = outcome.stage_run().unwrap();
        assert_eq!(run.status, StageRunStatus::Completed);
        assert_eq!(run.context_digest.as_deref(), Some(payload.digest().as_str()));
        assert_eq!(h.persistence.stage_ids("acme-corp"), vec!["market"]);
        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(h.events.stage_ids_of(types::STAGE_COMPLETED), vec!["market"]);
    }

    #[tokio::test]
    async fn test_provider_failure_is_recorded() {
        let h = harness(ScriptedProvider::new().with_failure(
            "media",
            StageFailureKind::ProviderError,
            "HTTP 502",
        ));
        let stage = stage("media");

        let outcome = h
            .executor
            .execute("acme-corp", Uuid::new_v4(), &stage, &payload(&stage), &CancellationToken::new())
            .await
            .unwrap();

        let run = outcome.stage_run().unwrap();
        assert!(run.is_failed());
        assert_eq!(run.failure_kind, Some(StageFailureKind::ProviderError));
        assert_eq!(h.events.of_type(types::STAGE_FAILED).len(), 1);
        assert_eq!(h.persistence.stage_ids("acme-corp"), vec!["media"]);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let h = harness(ScriptedProvider::new().with_delay("media", Duration::from_millis(500)));
        let stage = stage("media");

        let outcome = h
            .executor
            .execute("acme-corp", Uuid::new_v4(), &stage, &payload(&stage), &CancellationToken::new())
            .await
            .unwrap();

        let run = outcome.stage_run().unwrap();
        assert_eq!(run.failure_kind, Some(StageFailureKind::Timeout));
        assert_eq!(
            h.events.of_type(types::STAGE_FAILED)[0].data["error_code"],
            "PROVIDER_TIMEOUT"
        );
    }

    #[tokio::test]
    async fn test_cancellation_skips_persistence() {
        let h = harness(ScriptedProvider::new().with_delay("media", Duration::from_secs(5)));
        let stage = StageDefinition::new("media", "Media", "focus", 10.0);
        let cancel = Arc::new(CancellationToken::new());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel("user request");
        });

        let outcome = h
            .executor
            .execute("acme-corp", Uuid::new_v4(), &stage, &payload(&stage), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, StageExecution::Cancelled);
        assert!(h.persistence.stage_ids("acme-corp").is_empty());
        assert!(h.events.of_type(types::STAGE_COMPLETED).is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_is_not_fatal() {
        let mut persistence = MockPersistenceAdapter::new();
        persistence
            .expect_save_stage_run()
            .times(1)
            .returning(|key, _| Err(PersistenceError::new("save_stage_run", key, "disk full")));

        let events = Arc::new(CollectingEventSink::new());
        let executor = StageExecutor::new(
            Arc::new(ScriptedProvider::new()),
            Arc::new(persistence),
            events.clone(),
            PipelineConfig::default(),
        );
        let stage = stage("market");

        let outcome = executor
            .execute("acme-corp", Uuid::new_v4(), &stage, &payload(&stage), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.stage_run().unwrap().is_completed());
        let persist_failed = events.of_type(types::STAGE_PERSIST_FAILED);
        assert_eq!(persist_failed.len(), 1);
        assert_eq!(persist_failed[0].data["message"], "disk full");
    }
}
