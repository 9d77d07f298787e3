//! The external reasoning provider.
//!
//! A provider call is stateless: it receives a stage definition and a request
//! payload and answers with opaque JSON or a classified failure. The response
//! schema is never interpreted here.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HttpAnalysisProvider, HttpProviderConfig};

use crate::context::RequestPayload;
use crate::errors::StageFailureKind;
use crate::registry::StageDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderResult {
    /// The provider answered with data.
    Success {
        /// Opaque result.
        data: serde_json::Value,
    },
    /// The call failed.
    Failure {
        /// Failure classification.
        kind: StageFailureKind,
        /// Human-readable description.
        message: String,
    },
}

impl ProviderResult {
    /// Creates a success result.
    #[must_use]
    pub fn success(data: serde_json::Value) -> Self {
        Self::Success { data }
    }

    /// Creates a failure result.
    #[must_use]
    pub fn failure(kind: StageFailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Creates a timeout failure for the given budget.
    #[must_use]
    pub fn timeout(budget: Duration) -> Self {
        Self::failure(
            StageFailureKind::Timeout,
            format!("provider did not answer within {:.3}s", budget.as_secs_f64()),
        )
    }

    /// Returns true for a success result.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A stateless request/response analysis backend.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Runs one stage.
    ///
    /// `timeout` is the budget for this call. The executor enforces it as
    /// well, so implementations may treat it as advisory.
    async fn invoke(
        &self,
        stage: &StageDefinition,
        payload: &RequestPayload,
        timeout: Duration,
    ) -> ProviderResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serialization_is_tagged() {
        let json = serde_json::to_value(ProviderResult::failure(
            StageFailureKind::SchemaMismatch,
            "not an object",
        ))
        .unwrap();

        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["kind"], "schema_mismatch");
    }

    #[test]
    fn test_timeout_message_mentions_budget() {
        let result = ProviderResult::timeout(Duration::from_millis(1500));
        match result {
            ProviderResult::Failure { kind, message } => {
                assert_eq!(kind, StageFailureKind::Timeout);
                assert!(message.contains("1.500s"));
            }
            ProviderResult::Success { .. } => panic!("expected failure"),
        }
        assert!(ProviderResult::success(serde_json::json!({})).is_success());
    }
}
