//! Mock provider and persistence for testing.

use crate::context::RequestPayload;
use crate::core::StageRun;
use crate::errors::{PersistenceError, StageFailureKind};
use crate::persistence::{InMemoryPersistence, PersistenceAdapter};
use crate::provider::{AnalysisProvider, ProviderResult};
use crate::registry::StageDefinition;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One recorded provider call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The stage invoked.
    pub stage_id: String,
    /// The payload it received.
    pub payload: RequestPayload,
    /// The budget it was given.
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
struct ScriptedDelay {
    delay: Duration,
    /// Calls left to delay; `None` delays every call.
    remaining: Option<usize>,
}

/// A provider that answers from a per-stage script.
///
/// Unscripted stages succeed with `{"stage": id, "summary": "<id> findings"}`.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: Mutex<HashMap<String, ProviderResult>>,
    delays: Mutex<HashMap<String, ScriptedDelay>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    /// Creates a provider with no script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a success for a stage.
    #[must_use]
    pub fn with_success(self, stage_id: &str, data: serde_json::Value) -> Self {
        self.set_response(stage_id, ProviderResult::success(data));
        self
    }

    /// Scripts a failure for a stage.
    #[must_use]
    pub fn with_failure(self, stage_id: &str, kind: StageFailureKind, message: &str) -> Self {
        self.set_response(stage_id, ProviderResult::failure(kind, message));
        self
    }

    /// Delays every answer for a stage.
    #[must_use]
    pub fn with_delay(self, stage_id: &str, delay: Duration) -> Self {
        self.set_delay(stage_id, delay, None);
        self
    }

    /// Delays only the first answer for a stage.
    #[must_use]
    pub fn with_delay_once(self, stage_id: &str, delay: Duration) -> Self {
        self.set_delay(stage_id, delay, Some(1));
        self
    }

    fn set_delay(&self, stage_id: &str, delay: Duration, remaining: Option<usize>) {
        self.delays
            .lock()
            .insert(stage_id.to_string(), ScriptedDelay { delay, remaining });
    }

    /// Replaces the scripted response for a stage.
    pub fn set_response(&self, stage_id: &str, result: ProviderResult) {
        self.responses.lock().insert(stage_id.to_string(), result);
    }

    /// Total number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls for one stage.
    #[must_use]
    pub fn calls_for(&self, stage_id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.stage_id == stage_id)
            .count()
    }

    /// Stage ids in call order.
    #[must_use]
    pub fn called_stage_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|call| call.stage_id.clone())
            .collect()
    }

    /// Every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// The payload of the latest call for a stage.
    #[must_use]
    pub fn payload_for(&self, stage_id: &str) -> Option<RequestPayload> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|call| call.stage_id == stage_id)
            .map(|call| call.payload.clone())
    }

    /// Clears recorded calls.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    async fn invoke(
        &self,
        stage: &StageDefinition,
        payload: &RequestPayload,
        timeout: Duration,
    ) -> ProviderResult {
        self.calls.lock().push(RecordedCall {
            stage_id: stage.id.clone(),
            payload: payload.clone(),
            timeout,
        });

        let delay = self
            .delays
            .lock()
            .get_mut(&stage.id)
            .and_then(|scripted| match scripted.remaining.as_mut() {
                None => Some(scripted.delay),
                Some(0) => None,
                Some(left) => {
                    *left -= 1;
                    Some(scripted.delay)
                }
            });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.responses.lock().get(&stage.id).cloned();
        scripted.unwrap_or_else(|| {
            ProviderResult::success(serde_json::json!({
                "stage": stage.id,
                "summary": format!("{} findings", stage.id),
            }))
        })
    }
}

/// In-memory persistence with switchable failures.
///
/// Every operation is logged as `"<op>:<key>"`; reads also log the number of
/// records returned (`"get:<key>:<n>"`).
#[derive(Debug, Default)]
pub struct FlakyPersistence {
    inner: InMemoryPersistence,
    fail_reads: AtomicBool,
    fail_saves: AtomicBool,
    fail_clears: AtomicBool,
    failing_stages: Mutex<HashSet<String>>,
    operations: Mutex<Vec<String>>,
}

impl FlakyPersistence {
    /// Creates a store that never fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a pre-seeded in-memory store.
    #[must_use]
    pub fn wrapping(inner: InMemoryPersistence) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Makes every read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Makes every clear fail.
    pub fn set_fail_clears(&self, fail: bool) {
        self.fail_clears.store(fail, Ordering::SeqCst);
    }

    /// Makes saves of one stage fail.
    pub fn fail_saves_for(&self, stage_id: &str) {
        self.failing_stages.lock().insert(stage_id.to_string());
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &InMemoryPersistence {
        &self.inner
    }

    /// The operation log.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().clone()
    }

    fn log(&self, entry: String) {
        self.operations.lock().push(entry);
    }
}

#[async_trait]
impl PersistenceAdapter for FlakyPersistence {
    async fn get_stage_runs(&self, entity_key: &str) -> Result<Vec<StageRun>, PersistenceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            self.log(format!("get:{entity_key}:error"));
            return Err(PersistenceError::new("get_stage_runs", entity_key, "store unreachable"));
        }
        let runs = self.inner.get_stage_runs(entity_key).await?;
        self.log(format!("get:{entity_key}:{}", runs.len()));
        Ok(runs)
    }

    async fn save_stage_run(
        &self,
        entity_key: &str,
        stage_run: StageRun,
    ) -> Result<(), PersistenceError> {
        self.log(format!("save:{entity_key}:{}", stage_run.stage_id));
        if self.fail_saves.load(Ordering::SeqCst)
            || self.failing_stages.lock().contains(&stage_run.stage_id)
        {
            return Err(PersistenceError::new("save_stage_run", entity_key, "write rejected"));
        }
        self.inner.save_stage_run(entity_key, stage_run).await
    }

    async fn clear(&self, entity_key: &str) -> Result<(), PersistenceError> {
        self.log(format!("clear:{entity_key}"));
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(PersistenceError::new("clear", entity_key, "store unreachable"));
        }
        self.inner.clear(entity_key).await
    }
}
