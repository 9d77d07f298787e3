//! The request sent to the analysis provider for one stage.

use crate::core::EntityProfile;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Input for a single provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// The stage being executed.
    pub stage_id: String,
    /// The entity under analysis.
    pub entity_profile: EntityProfile,
    /// Results of earlier completed stages, keyed by stage id.
    #[serde(default)]
    pub accumulated_context: BTreeMap<String, serde_json::Value>,
    /// The stage's focus instruction.
    pub stage_focus: String,
}

impl RequestPayload {
    /// Returns the ids of the stages whose results are included.
    #[must_use]
    pub fn context_stage_ids(&self) -> Vec<&str> {
        self.accumulated_context.keys().map(String::as_str).collect()
    }

    /// Returns true if the result of `stage_id` is part of the context.
    #[must_use]
    pub fn has_context_for(&self, stage_id: &str) -> bool {
        self.accumulated_context.contains_key(stage_id)
    }

    /// Returns the hex SHA-256 digest of the serialized payload.
    ///
    /// Map keys are ordered, so equal payloads always share a digest.
    #[must_use]
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
