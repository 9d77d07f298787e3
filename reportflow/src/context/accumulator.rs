//! Builds request payloads from completed stage runs.

use super::RequestPayload;
use crate::core::{EntityProfile, StageRun};
use crate::errors::StageNotFoundError;
use crate::registry::{StageDefinition, StageRegistry};
use std::collections::BTreeMap;

/// Pure payload builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAccumulator;

impl ContextAccumulator {
    /// Builds the payload for `stage` from every completed run in `runs`.
    ///
    /// Failed and non-terminal runs contribute nothing. The caller is
    /// responsible for passing only runs of earlier stages.
    #[must_use]
    pub fn build(
        profile: &EntityProfile,
        stage: &StageDefinition,
        runs: &[StageRun],
    ) -> RequestPayload {
        let accumulated_context: BTreeMap<_, _> = runs
            .iter()
            .filter(|run| run.is_completed() && run.stage_id != stage.id)
            .filter_map(|run| {
                run.result
                    .as_ref()
                    .map(|result| (run.stage_id.clone(), result.clone()))
            })
            .collect();

        RequestPayload {
            stage_id: stage.id.clone(),
            entity_profile: profile.clone(),
            accumulated_context,
            stage_focus: stage.focus.clone(),
        }
    }

    /// Builds the payload for the stage at `index`, using only runs of stages
    /// strictly before it in registry order.
    pub fn build_for_index(
        profile: &EntityProfile,
        registry: &StageRegistry,
        runs: &[StageRun],
        index: usize,
    ) -> Result<RequestPayload, StageNotFoundError> {
        let stage = registry
            .stages()
            .get(index)
            .ok_or_else(|| StageNotFoundError::new(format!("#{index}")))?;

        let earlier: Vec<StageRun> = runs
            .iter()
            .filter(|run| registry.index_of(&run.stage_id).is_some_and(|i| i < index))
            .cloned()
            .collect();

        Ok(Self::build(profile, stage, &earlier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageFailureKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn completed(stage_id: &str, data: serde_json::Value) -> StageRun {
        let mut run = StageRun::pending(stage_id);
        run.start().unwrap();
        run.complete(data).unwrap();
        run
    }

    fn failed(stage_id: &str) -> StageRun {
        let mut run = StageRun::pending(stage_id);
        run.start().unwrap();
        run.fail(StageFailureKind::ProviderError, "boom").unwrap();
        run
    }

    fn profile() -> EntityProfile {
        EntityProfile::new("Acme Corp", "software")
    }

    #[test]
    fn test_first_stage_has_empty_context() {
        let registry = StageRegistry::standard();
        let payload = ContextAccumulator::build_for_index(&profile(), &registry, &[], 0).unwrap();

        assert_eq!(payload.stage_id, "market");
        assert!(payload.accumulated_context.is_empty());
        assert_eq!(payload.stage_focus, registry.stages()[0].focus);
    }

    #[test]
    fn test_failed_stages_contribute_nothing() {
        let registry = StageRegistry::standard();
        let runs = vec![
            completed("market", json!({"trends": ["cloud"]})),
            failed("competitive"),
            StageRun::pending("media"),
        ];

        let payload = ContextAccumulator::build_for_index(&profile(), &registry, &runs, 3).unwrap();
        assert_eq!(payload.context_stage_ids(), vec!["market"]);
        assert_eq!(payload.accumulated_context["market"], json!({"trends": ["cloud"]}));
    }

    #[test]
    fn test_later_results_are_excluded() {
        let registry = StageRegistry::standard();
        let runs = vec![
            completed("market", json!({"a": 1})),
            completed("competitive", json!({"b": 2})),
            completed("regulatory", json!({"c": 3})),
        ];

        let payload = ContextAccumulator::build_for_index(&profile(), &registry, &runs, 2).unwrap();
        assert_eq!(payload.stage_id, "media");
        assert_eq!(payload.context_stage_ids(), vec!["competitive", "market"]);
        assert!(!payload.has_context_for("regulatory"));
    }

    #[test]
    fn test_out_of_range_index() {
        let registry = StageRegistry::standard();
        let err = ContextAccumulator::build_for_index(&profile(), &registry, &[], 6).unwrap_err();
        assert_eq!(err.stage_id, "#6");
    }

    #[test]
    fn test_digest_is_deterministic() {
        let registry = StageRegistry::standard();
        let runs = vec![completed("market", json!({"z": 1, "a": 2}))];

        let first = ContextAccumulator::build_for_index(&profile(), &registry, &runs, 1).unwrap();
        let second = ContextAccumulator::build_for_index(&profile(), &registry, &runs, 1).unwrap();
        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.digest().len(), 64);

        let other = ContextAccumulator::build_for_index(&profile(), &registry, &[], 1).unwrap();
        assert_ne!(first.digest(), other.digest());
    }
}
