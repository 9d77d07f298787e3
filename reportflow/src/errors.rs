//! Error types for the reportflow orchestrator.
//!
//! Only [`FatalConfigError`] is meant to reach callers of the orchestrator as a
//! hard failure. Provider failures are recorded on the stage run, persistence
//! failures are logged, and synthesis never fails.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for reportflow operations.
#[derive(Debug, Error)]
pub enum ReportflowError {
    /// The entity profile is missing mandatory fields.
    #[error("{0}")]
    FatalConfig(#[from] FatalConfigError),

    /// The durable store could not be reached.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// A stage id was not present in the registry.
    #[error("{0}")]
    StageNotFound(#[from] StageNotFoundError),

    /// The stage registry was built from an invalid definition list.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// A stage run was driven through a transition it does not allow.
    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransitionError),

    /// Pipeline configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The run was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Raised when the entity profile cannot start a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Entity profile is missing required fields: {}", missing_fields.join(", "))]
pub struct FatalConfigError {
    /// Names of the mandatory fields that were absent or blank.
    pub missing_fields: Vec<String>,
}

impl FatalConfigError {
    /// Creates a new fatal config error.
    #[must_use]
    pub fn new(missing_fields: Vec<String>) -> Self {
        Self { missing_fields }
    }

    /// Returns true if the given field is among the missing ones.
    #[must_use]
    pub fn is_missing(&self, field: &str) -> bool {
        self.missing_fields.iter().any(|f| f == field)
    }
}

/// Raised when the durable store is unreachable or rejects an operation.
#[derive(Debug, Clone, Error)]
#[error("Persistence {operation} failed for '{entity_key}': {message}")]
pub struct PersistenceError {
    /// The adapter operation (`get_stage_runs`, `save_stage_run`, `clear`).
    pub operation: String,
    /// The entity key the operation targeted.
    pub entity_key: String,
    /// Underlying failure description.
    pub message: String,
}

impl PersistenceError {
    /// Creates a new persistence error.
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        entity_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            entity_key: entity_key.into(),
            message: message.into(),
        }
    }
}

/// Raised when looking up an unknown stage id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage not found: {stage_id}")]
pub struct StageNotFoundError {
    /// The requested stage id.
    pub stage_id: String,
}

impl StageNotFoundError {
    /// Creates a new stage not found error.
    #[must_use]
    pub fn new(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
        }
    }
}

/// Raised when a stage registry is built from invalid definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No stage definitions were supplied.
    #[error("Stage registry must contain at least one stage")]
    Empty,

    /// Two definitions share an id.
    #[error("Duplicate stage id in registry: {0}")]
    DuplicateId(String),

    /// A definition has a non-positive duration budget.
    #[error("Stage '{0}' must have a positive nominal duration")]
    InvalidDuration(String),
}

/// Raised when a stage run would move through a forbidden transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage '{stage_id}' cannot move from {from} to {to}")]
pub struct InvalidTransitionError {
    /// The stage whose run was being updated.
    pub stage_id: String,
    /// The current status.
    pub from: String,
    /// The requested status.
    pub to: String,
}

impl InvalidTransitionError {
    /// Creates a new invalid transition error.
    #[must_use]
    pub fn new(
        stage_id: impl Into<String>,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        Self {
            stage_id: stage_id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Raised when configuration values are out of range or unparsable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration for '{key}': {message}")]
pub struct ConfigError {
    /// The configuration key.
    pub key: String,
    /// What was wrong with it.
    pub message: String,
}

impl ConfigError {
    /// Creates a new config error.
    #[must_use]
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFailureKind {
    /// The stage call exceeded its time budget.
    Timeout,
    /// The provider returned an error status.
    ProviderError,
    /// The provider answered with something that could not be understood.
    SchemaMismatch,
}

impl StageFailureKind {
    /// Returns a stable error code for logs and events.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout => "PROVIDER_TIMEOUT",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
        }
    }
}

impl fmt::Display for StageFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ProviderError => write!(f, "provider_error"),
            Self::SchemaMismatch => write!(f, "schema_mismatch"),
        }
    }
}

impl ReportflowError {
    /// Returns true if the error should abort the caller's request.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfig(_) | Self::Config(_) | Self::Registry(_))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::FatalConfig(err) => {
                map.insert(
                    "missing_fields".to_string(),
                    serde_json::json!(err.missing_fields),
                );
                "FatalConfigError"
            }
            Self::Persistence(err) => {
                map.insert("operation".to_string(), serde_json::json!(err.operation));
                map.insert("entity_key".to_string(), serde_json::json!(err.entity_key));
                "PersistenceError"
            }
            Self::StageNotFound(err) => {
                map.insert("stage_id".to_string(), serde_json::json!(err.stage_id));
                "StageNotFound"
            }
            Self::Registry(_) => "RegistryError",
            Self::InvalidTransition(err) => {
                map.insert("stage_id".to_string(), serde_json::json!(err.stage_id));
                "InvalidTransition"
            }
            Self::Config(err) => {
                map.insert("key".to_string(), serde_json::json!(err.key));
                "ConfigError"
            }
            Self::Cancelled(_) => "Cancelled",
            Self::Internal(_) => "Internal",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_config_error_message() {
        let err = FatalConfigError::new(vec!["name".to_string(), "industry".to_string()]);

        assert!(err.to_string().contains("name, industry"));
        assert!(err.is_missing("name"));
        assert!(!err.is_missing("description"));
    }

    #[test]
    fn test_fatal_errors_are_fatal() {
        let err: ReportflowError = FatalConfigError::new(vec!["name".to_string()]).into();
        assert!(err.is_fatal());

        let err: ReportflowError =
            PersistenceError::new("save_stage_run", "acme", "connection refused").into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_to_dict() {
        let err: ReportflowError = StageNotFoundError::new("unknown").into();
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "StageNotFound");
        assert_eq!(dict.get("stage_id").unwrap(), "unknown");
    }

    #[test]
    fn test_failure_kind_codes() {
        assert_eq!(StageFailureKind::Timeout.error_code(), "PROVIDER_TIMEOUT");
        assert_eq!(StageFailureKind::ProviderError.to_string(), "provider_error");

        let json = serde_json::to_string(&StageFailureKind::SchemaMismatch).unwrap();
        assert_eq!(json, r#""schema_mismatch""#);
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = InvalidTransitionError::new("media", "completed", "running");
        assert_eq!(
            err.to_string(),
            "Stage 'media' cannot move from completed to running"
        );
    }
}
