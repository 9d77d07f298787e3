//! Logging setup and timing helpers.

use crate::config::LoggingConfig;
use crate::errors::ConfigError;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns an error if the
/// directive cannot be parsed or a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConfigError::new("logging.level", e.to_string()))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ConfigError::new("logging", e.to_string()))
}

/// Measures the wall-clock duration of a stage.
#[derive(Debug)]
pub struct StageTimer {
    start: Instant,
    stage_id: String,
}

impl StageTimer {
    /// Starts a timer for a stage.
    #[must_use]
    pub fn start(stage_id: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            stage_id: stage_id.into(),
        }
    }

    /// Returns the stage id.
    #[must_use]
    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stops the timer and returns the duration in milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_timer() {
        let timer = StageTimer::start("market");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.stage_id(), "market");
        assert!(timer.finish() >= 10.0);
    }

    #[test]
    fn test_init_tracing_rejects_bad_directive_or_double_init() {
        let config = LoggingConfig {
            level: "info".to_string(),
            json: false,
        };
        // The first call may succeed; a second must fail because a global
        // subscriber is already installed.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
