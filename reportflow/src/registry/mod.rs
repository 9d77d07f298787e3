//! Ordered catalog of analysis stages.
//!
//! The registry is pure data. Its order is the dependency order: a stage may
//! only consume results of the stages listed before it.

use crate::errors::{RegistryError, StageNotFoundError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// What kind of output a stage produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Produces raw findings for the mapping table.
    #[default]
    Analysis,
    /// May produce report sections that are already in canonical shape.
    Synthesis,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis => write!(f, "analysis"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// Definition of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Stable id, used as the persistence key.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// What the provider should concentrate on.
    pub focus: String,
    /// Expected duration of the provider call.
    pub nominal_duration_seconds: f64,
    /// Output kind.
    #[serde(default)]
    pub kind: StageKind,
}

impl StageDefinition {
    /// Creates an analysis stage definition.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        focus: impl Into<String>,
        nominal_duration_seconds: f64,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            focus: focus.into(),
            nominal_duration_seconds,
            kind: StageKind::Analysis,
        }
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the nominal duration as a `Duration`.
    #[must_use]
    pub fn nominal_duration(&self) -> Duration {
        Duration::from_secs_f64(self.nominal_duration_seconds.max(0.0))
    }

    /// Returns true for synthesis-kind stages.
    #[must_use]
    pub fn is_synthesis(&self) -> bool {
        self.kind == StageKind::Synthesis
    }
}

/// Immutable, ordered list of stage definitions.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<StageDefinition>,
}

impl StageRegistry {
    /// Creates a registry from an ordered definition list.
    pub fn new(stages: Vec<StageDefinition>) -> Result<Self, RegistryError> {
        if stages.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.id.as_str()) {
                return Err(RegistryError::DuplicateId(stage.id.clone()));
            }
            if !(stage.nominal_duration_seconds > 0.0) {
                return Err(RegistryError::InvalidDuration(stage.id.clone()));
            }
        }

        Ok(Self { stages })
    }

    /// The standard six-stage strategic analysis catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            stages: vec![
                StageDefinition::new(
                    "market",
                    "Market Dynamics",
                    "market size, growth drivers, demand shifts and pricing trends",
                    45.0,
                ),
                StageDefinition::new(
                    "competitive",
                    "Competitive Landscape",
                    "competitor positioning, recent competitor actions and threats",
                    60.0,
                ),
                StageDefinition::new(
                    "media",
                    "Media & Sentiment",
                    "press coverage, public sentiment and narrative risks",
                    45.0,
                ),
                StageDefinition::new(
                    "regulatory",
                    "Regulatory Environment",
                    "pending regulation, compliance exposure and policy changes",
                    50.0,
                ),
                StageDefinition::new(
                    "forward",
                    "Forward Outlook",
                    "scenarios, leading indicators and strategic recommendations",
                    40.0,
                ),
                StageDefinition::new(
                    "synthesis",
                    "Executive Synthesis",
                    "executive summary across all prior findings",
                    60.0,
                )
                .with_kind(StageKind::Synthesis),
            ],
        }
    }

    /// Returns the ordered stage definitions.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Looks up a stage by id.
    pub fn by_id(&self, id: &str) -> Result<&StageDefinition, StageNotFoundError> {
        self.stages
            .iter()
            .find(|stage| stage.id == id)
            .ok_or_else(|| StageNotFoundError::new(id))
    }

    /// Returns the position of a stage in the order.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.id == id)
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false; a registry holds at least one stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Sum of the nominal durations of the stages from `index` onward.
    #[must_use]
    pub fn estimated_seconds_from(&self, index: usize) -> f64 {
        self.stages
            .iter()
            .skip(index)
            .map(|stage| stage.nominal_duration_seconds)
            .sum()
    }

    /// Sum of all nominal durations.
    #[must_use]
    pub fn estimated_total_seconds(&self) -> f64 {
        self.estimated_seconds_from(0)
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        let registry = StageRegistry::standard();
        let ids: Vec<_> = registry.stages().iter().map(|s| s.id.as_str()).collect();

        assert_eq!(
            ids,
            vec!["market", "competitive", "media", "regulatory", "forward", "synthesis"]
        );
        assert!(registry.by_id("synthesis").unwrap().is_synthesis());
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_by_id_not_found() {
        let registry = StageRegistry::standard();
        let err = registry.by_id("weather").unwrap_err();
        assert_eq!(err.stage_id, "weather");
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert_eq!(StageRegistry::new(Vec::new()).unwrap_err(), RegistryError::Empty);

        let err = StageRegistry::new(vec![
            StageDefinition::new("a", "A", "focus", 1.0),
            StageDefinition::new("a", "A again", "focus", 1.0),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("a".to_string()));
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let err = StageRegistry::new(vec![StageDefinition::new("a", "A", "focus", 0.0)])
            .unwrap_err();
        assert_eq!(err, RegistryError::InvalidDuration("a".to_string()));
    }

    #[test]
    fn test_estimates() {
        let registry = StageRegistry::standard();
        assert!((registry.estimated_total_seconds() - 300.0).abs() < f64::EPSILON);
        assert!((registry.estimated_seconds_from(5) - 60.0).abs() < f64::EPSILON);
        assert_eq!(registry.index_of("media"), Some(2));
    }
}
