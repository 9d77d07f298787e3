//! JSON-file persistence adapter.

use super::{upsert, PersistenceAdapter};
use crate::core::StageRun;
use crate::errors::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Longest key used verbatim as a file stem.
const MAX_PLAIN_STEM: usize = 128;

/// On-disk document for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredStageRuns {
    entity_key: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    stages: Vec<StageRun>,
}

/// Stores one JSON document per entity key under a root directory.
///
/// Writes for a key are serialized by a per-key async mutex and go through a
/// temporary file followed by a rename.
#[derive(Debug)]
pub struct FilePersistence {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FilePersistence {
    /// Creates an adapter rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the document path for an entity key.
    ///
    /// Short ASCII keys map to their own file name. Any other key maps to a
    /// fixed-length sha256 stem, which the document's `entity_key` field
    /// disambiguates for humans.
    #[must_use]
    pub fn path_for(&self, entity_key: &str) -> PathBuf {
        let plain = !entity_key.is_empty()
            && entity_key.len() <= MAX_PLAIN_STEM
            && entity_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let stem = if plain {
            entity_key.to_string()
        } else {
            format!("k-{}", hex::encode(Sha256::digest(entity_key.as_bytes())))
        };
        self.root.join(format!("{stem}.json"))
    }

    fn lock_for(&self, entity_key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(entity_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read(&self, entity_key: &str) -> Result<Vec<StageRun>, PersistenceError> {
        let path = self.path_for(entity_key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PersistenceError::new("get_stage_runs", entity_key, e.to_string()))
            }
        };

        let stored: StoredStageRuns = serde_json::from_slice(&bytes).map_err(|e| {
            PersistenceError::new(
                "get_stage_runs",
                entity_key,
                format!("corrupt document {}: {e}", path.display()),
            )
        })?;
        Ok(stored.stages)
    }

    async fn write(&self, entity_key: &str, stages: Vec<StageRun>) -> Result<(), PersistenceError> {
        let err = |e: &dyn std::fmt::Display| {
            PersistenceError::new("save_stage_run", entity_key, e.to_string())
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| err(&e))?;

        let document = StoredStageRuns {
            entity_key: entity_key.to_string(),
            updated_at: Utc::now(),
            stages,
        };
        let json = serde_json::to_vec_pretty(&document).map_err(|e| err(&e))?;

        let path = self.path_for(entity_key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| err(&e))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| err(&e))?;

        debug!(entity_key, path = %path.display(), "Stage runs written");
        Ok(())
    }
}

#[async_trait]
impl PersistenceAdapter for FilePersistence {
    async fn get_stage_runs(&self, entity_key: &str) -> Result<Vec<StageRun>, PersistenceError> {
        let lock = self.lock_for(entity_key);
        let _guard = lock.lock().await;
        self.read(entity_key).await
    }

    async fn save_stage_run(
        &self,
        entity_key: &str,
        stage_run: StageRun,
    ) -> Result<(), PersistenceError> {
        let lock = self.lock_for(entity_key);
        let _guard = lock.lock().await;

        let mut stages = self.read(entity_key).await.map_err(|mut e| {
            e.operation = "save_stage_run".to_string();
            e
        })?;
        upsert(&mut stages, stage_run);
        self.write(entity_key, stages).await
    }

    async fn clear(&self, entity_key: &str) -> Result<(), PersistenceError> {
        let lock = self.lock_for(entity_key);
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.path_for(entity_key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::new("clear", entity_key, e.to_string())),
        }
    }
}
