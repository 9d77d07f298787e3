//! Public entry point: starts, restarts, cancels and observes runs.

use super::controller::{CompletionCallback, RunController, RunServices};
use super::PipelineRun;
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{ControllerState, EntityProfile};
use crate::errors::{FatalConfigError, ReportflowError};
use crate::events::{types, EventSink, LoggingEventSink, PipelineEvent};
use crate::executor::StageExecutor;
use crate::persistence::PersistenceAdapter;
use crate::progress::{ProgressReporter, ProgressView};
use crate::provider::AnalysisProvider;
use crate::registry::StageRegistry;
use crate::synthesis::{MappingTable, SynthesisEngine, SynthesisReport};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    /// A new run was registered and spawned.
    Started {
        /// The new run.
        run_id: Uuid,
    },
    /// A run for the key was already active; nothing was started.
    AlreadyRunning {
        /// The active run.
        run_id: Uuid,
    },
}

impl StartOutcome {
    /// The run id, new or existing.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Started { run_id } | Self::AlreadyRunning { run_id } => *run_id,
        }
    }

    /// Returns true if this request started a run.
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

/// Single-flight slot of an active run.
struct ActiveRun {
    run_id: Uuid,
    cancel: Arc<CancellationToken>,
    done: watch::Receiver<bool>,
}

/// A held slot whose run has not been spawned yet.
struct Reservation {
    cancel: Arc<CancellationToken>,
    guard: SlotGuard,
}

/// Releases the slot when the controller task ends, even by panic, or when
/// an unlaunched reservation is dropped.
struct SlotGuard {
    active: Arc<DashMap<String, ActiveRun>>,
    entity_key: String,
    run_id: Uuid,
    done: watch::Sender<bool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active
            .remove_if(&self.entity_key, |_, slot| slot.run_id == self.run_id);
        self.done.send_replace(true);
    }
}

/// Runs the stage catalog for entities, at most one run per entity key.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    services: Arc<RunServices>,
    active: Arc<DashMap<String, ActiveRun>>,
    runs: Arc<DashMap<String, Arc<RwLock<PipelineRun>>>>,
}

impl Orchestrator {
    /// Creates an orchestrator with the standard registry and default config.
    #[must_use]
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        persistence: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        OrchestratorBuilder::new(provider, persistence).assemble()
    }

    /// Starts building an orchestrator.
    #[must_use]
    pub fn builder(
        provider: Arc<dyn AnalysisProvider>,
        persistence: Arc<dyn PersistenceAdapter>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(provider, persistence)
    }

    /// Returns the stage registry.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.services.registry
    }

    /// Starts a run for the profile's entity, or reports the active one.
    ///
    /// Fails only when the profile is missing mandatory fields.
    pub async fn start_pipeline(&self, profile: EntityProfile) -> Result<StartOutcome, ReportflowError> {
        let entity_key = self.validate_profile(&profile).await?;

        let reservation = match self.active.entry(entity_key.clone()) {
            Entry::Occupied(slot) => {
                let active_id = slot.get().run_id;
                info!(entity_key = %entity_key, run_id = %active_id, "Run already active");
                return Ok(StartOutcome::AlreadyRunning { run_id: active_id });
            }
            Entry::Vacant(slot) => {
                let (active, reservation) = self.new_slot(&entity_key);
                slot.insert(active);
                reservation
            }
        };

        self.launch(entity_key, profile, reservation)
    }

    /// Discards all persisted state for the entity and starts from stage one.
    ///
    /// The key's slot is taken over for the whole restart, so concurrent
    /// starts report the restarted run. An active run is cancelled and
    /// awaited before `clear`. A failing `clear` is returned to the caller,
    /// the slot is released and nothing is started.
    pub async fn restart_pipeline(&self, profile: EntityProfile) -> Result<StartOutcome, ReportflowError> {
        let entity_key = self.validate_profile(&profile).await?;

        let (reservation, previous) = {
            let (active, reservation) = self.new_slot(&entity_key);
            match self.active.entry(entity_key.clone()) {
                Entry::Occupied(mut slot) => {
                    let previous = slot.insert(active);
                    previous.cancel.cancel("restart requested");
                    (reservation, Some(previous.done))
                }
                Entry::Vacant(slot) => {
                    slot.insert(active);
                    (reservation, None)
                }
            }
        };

        if let Some(mut done) = previous {
            // A dropped sender also means the task is gone.
            let _ = done.wait_for(|finished| *finished).await;
        }

        self.services.persistence.clear(&entity_key).await?;
        self.services.reports.remove(&entity_key);
        info!(entity_key = %entity_key, "Persisted stage runs cleared for restart");

        self.launch(entity_key, profile, reservation)
    }

    /// Requests cancellation of the active run. Returns false if there is none
    /// or it was already cancelled.
    pub fn cancel(&self, entity_key: &str, reason: impl Into<String>) -> bool {
        let token = self.active.get(entity_key).map(|slot| slot.cancel.clone());
        token.is_some_and(|token| token.cancel(reason))
    }

    /// Returns true while a run for the key is active.
    #[must_use]
    pub fn is_running(&self, entity_key: &str) -> bool {
        self.active.contains_key(entity_key)
    }

    /// Latest progress view for the key.
    #[must_use]
    pub fn get_progress(&self, entity_key: &str) -> Option<ProgressView> {
        self.services.reporter.status(entity_key)
    }

    /// Subscribes to progress updates for the key.
    #[must_use]
    pub fn subscribe_progress(&self, entity_key: &str) -> watch::Receiver<Option<ProgressView>> {
        self.services.reporter.subscribe(entity_key)
    }

    /// Returns a handle to the progress reporter.
    #[must_use]
    pub fn progress_reporter(&self) -> ProgressReporter {
        self.services.reporter.clone()
    }

    /// Registers a callback invoked once for every run of the key that
    /// completes after registration.
    pub fn on_complete<F>(&self, entity_key: impl Into<String>, callback: F)
    where
        F: Fn(&SynthesisReport) + Send + Sync + 'static,
    {
        let callback: CompletionCallback = Arc::new(callback);
        self.services
            .callbacks
            .entry(entity_key.into())
            .or_default()
            .push(callback);
    }

    /// The report of the latest completed run for the key.
    #[must_use]
    pub fn report(&self, entity_key: &str) -> Option<Arc<SynthesisReport>> {
        self.services
            .reports
            .get(entity_key)
            .map(|report| report.value().clone())
    }

    /// Snapshot of the latest run for the key.
    #[must_use]
    pub fn pipeline_run(&self, entity_key: &str) -> Option<PipelineRun> {
        self.runs.get(entity_key).map(|run| run.read().clone())
    }

    /// Forgets everything retained for an idle key: the last run, its report,
    /// completion callbacks and the progress channel. Persisted stage runs
    /// are untouched. Returns false, changing nothing, while a run is active.
    pub fn evict(&self, entity_key: &str) -> bool {
        let Entry::Vacant(_slot) = self.active.entry(entity_key.to_string()) else {
            return false;
        };
        // The vacant entry keeps starts for this key out until eviction ends.
        self.runs.remove(entity_key);
        self.services.reports.remove(entity_key);
        self.services.callbacks.remove(entity_key);
        self.services.reporter.remove(entity_key);
        info!(entity_key, "Entity state evicted");
        true
    }

    /// Waits until no run is active for the key and returns its latest view.
    pub async fn wait(&self, entity_key: &str) -> Option<ProgressView> {
        let done = self.active.get(entity_key).map(|slot| slot.done.clone());
        if let Some(mut done) = done {
            // A dropped sender also means the task is gone.
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.get_progress(entity_key)
    }

    /// Cancels every active run and waits for all of them to stop.
    pub async fn shutdown(&self, reason: &str) {
        let waiters: Vec<watch::Receiver<bool>> = self
            .active
            .iter()
            .map(|slot| {
                slot.cancel.cancel(reason);
                slot.done.clone()
            })
            .collect();

        futures::future::join_all(waiters.into_iter().map(|mut done| async move {
            let _ = done.wait_for(|finished| *finished).await;
        }))
        .await;
    }

    /// Builds a slot entry and the reservation that releases it.
    ///
    /// Must not be dropped while the caller holds an entry of `active`.
    fn new_slot(&self, entity_key: &str) -> (ActiveRun, Reservation) {
        let run_id = Uuid::new_v4();
        let cancel = Arc::new(CancellationToken::new());
        let (done_tx, done_rx) = watch::channel(false);
        let active = ActiveRun {
            run_id,
            cancel: cancel.clone(),
            done: done_rx,
        };
        let reservation = Reservation {
            cancel,
            guard: SlotGuard {
                active: self.active.clone(),
                entity_key: entity_key.to_string(),
                run_id,
                done: done_tx,
            },
        };
        (active, reservation)
    }

    /// Registers the run of a held slot and spawns its controller.
    fn launch(
        &self,
        entity_key: String,
        profile: EntityProfile,
        reservation: Reservation,
    ) -> Result<StartOutcome, ReportflowError> {
        let Reservation { cancel, guard } = reservation;
        let run_id = guard.run_id;

        let mut run = PipelineRun::new(run_id, &entity_key, &self.services.registry);
        run.transition(ControllerState::Checking)?;
        self.services.publish(&run);
        let run = Arc::new(RwLock::new(run));
        self.runs.insert(entity_key.clone(), run.clone());

        let controller = RunController::new(self.services.clone(), profile, run, cancel);
        tokio::spawn(async move {
            let _guard = guard;
            controller.drive().await;
        });

        info!(entity_key = %entity_key, run_id = %run_id, "Run registered");
        Ok(StartOutcome::Started { run_id })
    }

    /// Validates the profile and returns its entity key.
    ///
    /// On failure, records an aborted run for the key when one is derivable
    /// and no run is active for it.
    async fn validate_profile(&self, profile: &EntityProfile) -> Result<String, ReportflowError> {
        let validated = profile
            .validate()
            .and_then(|()| {
                profile
                    .entity_key()
                    .ok_or_else(|| FatalConfigError::new(vec!["key".to_string()]))
            });

        let err = match validated {
            Ok(entity_key) => return Ok(entity_key),
            Err(err) => err,
        };

        warn!(missing_fields = ?err.missing_fields, "Entity profile rejected");
        if let Some(entity_key) = profile.entity_key() {
            if !self.active.contains_key(&entity_key) {
                let mut run = PipelineRun::new(Uuid::new_v4(), &entity_key, &self.services.registry);
                run.mark_aborted();
                self.services.publish(&run);
                let run_id = run.run_id;
                self.runs.insert(entity_key.clone(), Arc::new(RwLock::new(run)));
                self.services
                    .events
                    .emit(
                        PipelineEvent::new(types::PIPELINE_ABORTED, &entity_key, run_id)
                            .with_data(json!({"missing_fields": err.missing_fields})),
                    )
                    .await;
            }
        }
        Err(err.into())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.services.registry.len())
            .field("active_runs", &self.active.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    provider: Arc<dyn AnalysisProvider>,
    persistence: Arc<dyn PersistenceAdapter>,
    registry: StageRegistry,
    config: PipelineConfig,
    events: Arc<dyn EventSink>,
    mapping: MappingTable,
}

impl OrchestratorBuilder {
    /// Creates a builder with the standard registry and default config.
    #[must_use]
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        persistence: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        Self {
            provider,
            persistence,
            registry: StageRegistry::standard(),
            config: PipelineConfig::default(),
            events: Arc::new(LoggingEventSink::default()),
            mapping: MappingTable::standard(),
        }
    }

    /// Sets the stage registry.
    #[must_use]
    pub fn with_registry(mut self, registry: StageRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the synthesis mapping table.
    #[must_use]
    pub fn with_mapping(mut self, mapping: MappingTable) -> Self {
        self.mapping = mapping;
        self
    }

    /// Validates the configuration and builds the orchestrator.
    pub fn build(self) -> Result<Orchestrator, ReportflowError> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> Orchestrator {
        let registry = Arc::new(self.registry);
        let executor = StageExecutor::new(
            self.provider,
            self.persistence.clone(),
            self.events.clone(),
            self.config,
        );
        let synthesis = SynthesisEngine::new(&registry).with_mapping(self.mapping);

        Orchestrator {
            services: Arc::new(RunServices {
                registry,
                executor,
                persistence: self.persistence,
                events: self.events,
                synthesis,
                reporter: ProgressReporter::new(),
                reports: DashMap::new(),
                callbacks: DashMap::new(),
            }),
            active: Arc::new(DashMap::new()),
            runs: Arc::new(DashMap::new()),
        }
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("stages", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
