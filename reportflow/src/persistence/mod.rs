//! Durable storage of stage runs keyed by (entity key, stage id).
//!
//! The orchestrator only reads persisted state when a run starts, writes each
//! terminal stage run once, and clears state on an explicit restart.
//! Implementations must serialize writes for the same entity key.

mod file;
mod memory;

pub use file::FilePersistence;
pub use memory::InMemoryPersistence;

use crate::core::StageRun;
use crate::errors::PersistenceError;
use async_trait::async_trait;

/// Storage backend for stage runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Returns the stage runs recorded for an entity, in stage order.
    ///
    /// Returns an empty list if nothing has been recorded.
    async fn get_stage_runs(&self, entity_key: &str) -> Result<Vec<StageRun>, PersistenceError>;

    /// Inserts or replaces the record for `stage_run.stage_id`.
    async fn save_stage_run(
        &self,
        entity_key: &str,
        stage_run: StageRun,
    ) -> Result<(), PersistenceError>;

    /// Removes every record for an entity.
    async fn clear(&self, entity_key: &str) -> Result<(), PersistenceError>;
}

/// Replaces the record with the same stage id or appends a new one.
pub(crate) fn upsert(records: &mut Vec<StageRun>, stage_run: StageRun) {
    match records.iter_mut().find(|r| r.stage_id == stage_run.stage_id) {
        Some(existing) => *existing = stage_run,
        None => records.push(stage_run),
    }
}
