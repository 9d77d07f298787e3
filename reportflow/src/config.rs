//! Configuration for the orchestrator and its ambient services.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Environment variable overriding [`PipelineConfig::timeout_factor`].
pub const ENV_TIMEOUT_FACTOR: &str = "REPORTFLOW_TIMEOUT_FACTOR";
/// Environment variable overriding [`PipelineConfig::min_stage_timeout_seconds`].
pub const ENV_MIN_STAGE_TIMEOUT: &str = "REPORTFLOW_MIN_STAGE_TIMEOUT_SECONDS";
/// Environment variable overriding [`LoggingConfig::level`].
pub const ENV_LOG_LEVEL: &str = "REPORTFLOW_LOG_LEVEL";
/// Environment variable overriding [`LoggingConfig::json`].
pub const ENV_LOG_JSON: &str = "REPORTFLOW_LOG_JSON";

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Multiplier applied to a stage's nominal duration to get its timeout.
    #[serde(default = "default_timeout_factor")]
    pub timeout_factor: f64,
    /// Lower bound for any stage timeout.
    #[serde(default = "default_min_stage_timeout")]
    pub min_stage_timeout_seconds: f64,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_timeout_factor() -> f64 {
    2.0
}

fn default_min_stage_timeout() -> f64 {
    0.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_factor: default_timeout_factor(),
            min_stage_timeout_seconds: default_min_stage_timeout(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout factor.
    #[must_use]
    pub fn with_timeout_factor(mut self, factor: f64) -> Self {
        self.timeout_factor = factor;
        self
    }

    /// Sets the minimum stage timeout.
    #[must_use]
    pub fn with_min_stage_timeout(mut self, seconds: f64) -> Self {
        self.min_stage_timeout_seconds = seconds;
        self
    }

    /// Builds a configuration from defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Builds a configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = vars.get(ENV_TIMEOUT_FACTOR) {
            config.timeout_factor = parse_f64(ENV_TIMEOUT_FACTOR, raw)?;
        }
        if let Some(raw) = vars.get(ENV_MIN_STAGE_TIMEOUT) {
            config.min_stage_timeout_seconds = parse_f64(ENV_MIN_STAGE_TIMEOUT, raw)?;
        }
        if let Some(level) = vars.get(ENV_LOG_LEVEL) {
            config.logging.level = level.trim().to_string();
        }
        if let Some(raw) = vars.get(ENV_LOG_JSON) {
            config.logging.json = parse_bool(ENV_LOG_JSON, raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.timeout_factor > 0.0) || !self.timeout_factor.is_finite() {
            return Err(ConfigError::new(
                "timeout_factor",
                format!("must be a positive number, got {}", self.timeout_factor),
            ));
        }
        if !(self.min_stage_timeout_seconds >= 0.0) || !self.min_stage_timeout_seconds.is_finite() {
            return Err(ConfigError::new(
                "min_stage_timeout_seconds",
                format!("must be zero or positive, got {}", self.min_stage_timeout_seconds),
            ));
        }
        if self.logging.level.is_empty() {
            return Err(ConfigError::new("logging.level", "must not be empty"));
        }
        Ok(())
    }

    /// Returns the timeout for a stage with the given nominal duration.
    #[must_use]
    pub fn stage_timeout(&self, nominal: Duration) -> Duration {
        let scaled = nominal.as_secs_f64() * self.timeout_factor;
        Duration::from_secs_f64(scaled.max(self.min_stage_timeout_seconds))
    }
}

/// Logging configuration for [`crate::observability::init_tracing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn parse_f64(key: &str, raw: &str) -> Result<f64, ConfigError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::new(key, format!("'{raw}' is not a number")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::new(key, format!("'{raw}' is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!((config.timeout_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stage_timeout_applies_factor_and_floor() {
        let config = PipelineConfig::default();
        assert_eq!(config.stage_timeout(Duration::from_secs(45)), Duration::from_secs(90));

        let config = config.with_min_stage_timeout(120.0);
        assert_eq!(config.stage_timeout(Duration::from_secs(45)), Duration::from_secs(120));
    }

    #[test]
    fn test_from_vars_overrides() {
        let config = PipelineConfig::from_vars(&vars(&[
            (ENV_TIMEOUT_FACTOR, "3.5"),
            (ENV_LOG_LEVEL, "reportflow=debug"),
            (ENV_LOG_JSON, "true"),
        ]))
        .unwrap();

        assert!((config.timeout_factor - 3.5).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "reportflow=debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_from_vars_rejects_bad_values() {
        let err = PipelineConfig::from_vars(&vars(&[(ENV_TIMEOUT_FACTOR, "fast")])).unwrap_err();
        assert_eq!(err.key, ENV_TIMEOUT_FACTOR);

        let err = PipelineConfig::from_vars(&vars(&[(ENV_TIMEOUT_FACTOR, "0")])).unwrap_err();
        assert_eq!(err.key, "timeout_factor");

        let err = PipelineConfig::from_vars(&vars(&[(ENV_LOG_JSON, "maybe")])).unwrap_err();
        assert_eq!(err.key, ENV_LOG_JSON);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: PipelineConfig =
            serde_json::from_value(serde_json::json!({"timeout_factor": 1.5})).unwrap();
        assert!((config.timeout_factor - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.logging, LoggingConfig::default());
    }
}
