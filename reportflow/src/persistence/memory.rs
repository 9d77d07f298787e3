//! In-memory persistence adapter.

use super::{upsert, PersistenceAdapter};
use crate::core::StageRun;
use crate::errors::PersistenceError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Keeps stage runs in a concurrent map.
///
/// Writes for one key hold that key's shard lock, so they are serialized.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    entries: DashMap<String, Vec<StageRun>>,
}

impl InMemoryPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with records for an entity.
    #[must_use]
    pub fn with_stage_runs(self, entity_key: impl Into<String>, runs: Vec<StageRun>) -> Self {
        self.entries.insert(entity_key.into(), runs);
        self
    }

    /// Returns the number of entities with records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the recorded stage ids for an entity, in stored order.
    #[must_use]
    pub fn stage_ids(&self, entity_key: &str) -> Vec<String> {
        self.entries
            .get(entity_key)
            .map(|runs| runs.iter().map(|r| r.stage_id.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryPersistence {
    async fn get_stage_runs(&self, entity_key: &str) -> Result<Vec<StageRun>, PersistenceError> {
        Ok(self
            .entries
            .get(entity_key)
            .map(|runs| runs.clone())
            .unwrap_or_default())
    }

    async fn save_stage_run(
        &self,
        entity_key: &str,
        stage_run: StageRun,
    ) -> Result<(), PersistenceError> {
        let mut records = self.entries.entry(entity_key.to_string()).or_default();
        upsert(&mut records, stage_run);
        Ok(())
    }

    async fn clear(&self, entity_key: &str) -> Result<(), PersistenceError> {
        self.entries.remove(entity_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(stage_id: &str, value: serde_json::Value) -> StageRun {
        let mut run = StageRun::pending(stage_id);
        run.start().unwrap();
        run.complete(value).unwrap();
        run
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty_list() {
        let store = InMemoryPersistence::new();
        assert!(store.get_stage_runs("acme-corp").await.unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_upserts_by_stage_id() {
        let store = InMemoryPersistence::new();
        store
            .save_stage_run("acme-corp", completed("market", serde_json::json!({"v": 1})))
            .await
            .unwrap();
        store
            .save_stage_run("acme-corp", completed("competitive", serde_json::json!({})))
            .await
            .unwrap();
        store
            .save_stage_run("acme-corp", completed("market", serde_json::json!({"v": 2})))
            .await
            .unwrap();

        let runs = store.get_stage_runs("acme-corp").await.unwrap();
        assert_eq!(store.stage_ids("acme-corp"), vec!["market", "competitive"]);
        assert_eq!(runs[0].result, Some(serde_json::json!({"v": 2})));
    }

    #[tokio::test]
    async fn test_clear_is_scoped_to_entity() {
        let store = InMemoryPersistence::new()
            .with_stage_runs("acme-corp", vec![completed("market", serde_json::json!({}))])
            .with_stage_runs("globex", vec![completed("market", serde_json::json!({}))]);

        store.clear("acme-corp").await.unwrap();

        assert!(store.get_stage_runs("acme-corp").await.unwrap().is_empty());
        assert_eq!(store.get_stage_runs("globex").await.unwrap().len(), 1);
    }
}
