//! The synthesis engine.

use super::mapping::{lookup, project_item, MappingTable};
use super::{ReportMetadata, SectionContent, SectionSource, SynthesisReport, CANONICAL_SECTIONS};
use crate::core::{EntityProfile, StageRun};
use crate::registry::StageRegistry;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Builds [`SynthesisReport`]s from terminal stage runs.
#[derive(Debug, Clone)]
pub struct SynthesisEngine {
    /// Synthesis-kind stage ids in registry order.
    synthesis_stages: Vec<String>,
    mapping: MappingTable,
}

impl SynthesisEngine {
    /// Creates an engine for a registry with the standard mapping table.
    #[must_use]
    pub fn new(registry: &StageRegistry) -> Self {
        Self {
            synthesis_stages: registry
                .stages()
                .iter()
                .filter(|stage| stage.is_synthesis())
                .map(|stage| stage.id.clone())
                .collect(),
            mapping: MappingTable::standard(),
        }
    }

    /// Replaces the mapping table.
    #[must_use]
    pub fn with_mapping(mut self, mapping: MappingTable) -> Self {
        self.mapping = mapping;
        self
    }

    /// Returns the mapping table.
    #[must_use]
    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    /// Builds a report. Never fails; unusable data yields placeholders.
    #[must_use]
    pub fn synthesize(&self, profile: &EntityProfile, stage_runs: &[StageRun]) -> SynthesisReport {
        let completed: BTreeMap<&str, &Value> = stage_runs
            .iter()
            .filter(|run| run.is_completed())
            .filter_map(|run| run.result.as_ref().map(|result| (run.stage_id.as_str(), result)))
            .collect();
        let failed = stage_runs.iter().filter(|run| run.is_failed()).count();

        let sections: BTreeMap<String, SectionContent> = CANONICAL_SECTIONS
            .iter()
            .map(|section| {
                let content = self
                    .pre_shaped(section, &completed)
                    .or_else(|| self.mapped(section, &completed))
                    .unwrap_or_else(|| SectionContent::placeholder(section));
                ((*section).to_string(), content)
            })
            .collect();

        let duration_seconds = stage_runs
            .iter()
            .filter(|run| run.is_terminal())
            .filter_map(StageRun::elapsed_seconds)
            .sum();

        let entity_key = profile.entity_key().unwrap_or_default();
        debug!(
            entity_key = %entity_key,
            stages_completed = completed.len(),
            stages_failed = failed,
            "Report synthesized"
        );

        SynthesisReport {
            entity_key,
            entity_name: profile.name.clone(),
            sections,
            metadata: ReportMetadata {
                stages_completed: completed.len(),
                stages_failed: failed,
                duration_seconds,
                generated_at: Utc::now(),
            },
        }
    }

    /// A section emitted in final shape by the latest completed synthesis stage.
    fn pre_shaped(&self, section: &str, completed: &BTreeMap<&str, &Value>) -> Option<SectionContent> {
        self.synthesis_stages.iter().rev().find_map(|stage_id| {
            let result = completed.get(stage_id.as_str())?;
            let shaped = result
                .get(section)
                .filter(|v| v.is_object())
                .or_else(|| lookup(result, &format!("sections.{section}")))?;

            let summary = shaped.get("summary")?.as_str()?.trim();
            if summary.is_empty() {
                return None;
            }
            let items = shaped
                .get("items")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(project_item).collect())
                .unwrap_or_default();

            Some(SectionContent {
                summary: summary.to_string(),
                items,
                source: SectionSource::Synthesis {
                    stage_id: stage_id.clone(),
                },
            })
        })
    }

    fn mapped(&self, section: &str, completed: &BTreeMap<&str, &Value>) -> Option<SectionContent> {
        self.mapping.rules_for(section).find_map(|rule| {
            let result = completed.get(rule.stage_id.as_str())?;
            let (summary, items) = rule.apply(result)?;
            Some(SectionContent {
                summary,
                items,
                source: SectionSource::Mapped {
                    stage_id: rule.stage_id.clone(),
                },
            })
        })
    }
}

impl Default for SynthesisEngine {
    fn default() -> Self {
        Self::new(&StageRegistry::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageFailureKind;
    use crate::synthesis::{MappingRule, SectionItem};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn completed(stage_id: &str, data: Value) -> StageRun {
        let mut run = StageRun::pending(stage_id);
        run.start().unwrap();
        run.complete(data).unwrap();
        run
    }

    fn failed(stage_id: &str) -> StageRun {
        let mut run = StageRun::pending(stage_id);
        run.start().unwrap();
        run.fail(StageFailureKind::ProviderError, "upstream 500: secret-token").unwrap();
        run
    }

    fn profile() -> EntityProfile {
        EntityProfile::new("Acme Corp", "software")
    }

    #[test]
    fn test_empty_input_yields_all_placeholders() {
        let report = SynthesisEngine::default().synthesize(&profile(), &[]);

        assert_eq!(report.sections.len(), 6);
        assert_eq!(report.placeholder_sections(), CANONICAL_SECTIONS.to_vec());
        assert_eq!(report.metadata.stages_completed, 0);
        assert_eq!(report.entity_key, "acme-corp");
        assert_eq!(report.entity_name, "Acme Corp");
    }

    #[test]
    fn test_mapped_section() {
        let runs = vec![completed(
            "competitive",
            json!({
                "summary": "Globex is undercutting on price",
                "competitor_actions": [
                    {"entity": "Globex", "action": "price cut", "magnitude_pct": 15},
                    {"action": "no title, dropped"},
                ],
            }),
        )];

        let report = SynthesisEngine::default().synthesize(&profile(), &runs);
        let section = report.section("competitive").unwrap();

        assert_eq!(
            section.source,
            SectionSource::Mapped {
                stage_id: "competitive".to_string()
            }
        );
        assert_eq!(section.items.len(), 1);
        assert_eq!(section.items[0].title, "Globex");
        assert!(report.section_mentions("competitive", "price cut"));
    }

    #[test]
    fn test_pre_shaped_section_wins_over_mapping() {
        let runs = vec![
            completed("market", json!({"summary": "raw market"})),
            completed(
                "synthesis",
                json!({
                    "executive_summary": "mapped executive",
                    "sections": {
                        "market": {"summary": "curated market", "items": ["pricing pressure"]},
                    },
                    "executive": {"summary": "curated executive"},
                }),
            ),
        ];

        let report = SynthesisEngine::default().synthesize(&profile(), &runs);

        let market = report.section("market").unwrap();
        assert_eq!(market.summary, "curated market");
        assert_eq!(market.items, vec![SectionItem::new("pricing pressure")]);
        assert_eq!(
            market.source,
            SectionSource::Synthesis {
                stage_id: "synthesis".to_string()
            }
        );
        assert_eq!(report.section("executive").unwrap().summary, "curated executive");
    }

    #[test]
    fn test_malformed_pre_shaped_falls_through() {
        let runs = vec![
            completed("media", json!({"summary": "mostly neutral coverage"})),
            completed("synthesis", json!({"media": {"summary": 7}, "sections": "oops"})),
        ];

        let report = SynthesisEngine::default().synthesize(&profile(), &runs);
        let media = report.section("media").unwrap();

        assert_eq!(media.summary, "mostly neutral coverage");
        assert!(matches!(media.source, SectionSource::Mapped { .. }));
        assert!(report.section("executive").unwrap().is_placeholder());
    }

    #[test]
    fn test_failed_stage_yields_placeholder_without_error_text() {
        let runs = vec![
            completed("market", json!({"summary": "ok"})),
            failed("media"),
        ];

        let report = SynthesisEngine::default().synthesize(&profile(), &runs);

        assert_eq!(report.section("media").unwrap(), &SectionContent::placeholder("media"));
        assert_eq!(report.metadata.stages_completed, 1);
        assert_eq!(report.metadata.stages_failed, 1);

        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("secret-token"));
    }

    #[test]
    fn test_latest_synthesis_stage_wins() {
        let registry = StageRegistry::new(vec![
            crate::registry::StageDefinition::new("draft", "Draft", "f", 1.0)
                .with_kind(crate::registry::StageKind::Synthesis),
            crate::registry::StageDefinition::new("final", "Final", "f", 1.0)
                .with_kind(crate::registry::StageKind::Synthesis),
        ])
        .unwrap();
        let runs = vec![
            completed("draft", json!({"executive": {"summary": "draft"}})),
            completed("final", json!({"executive": {"summary": "final"}})),
        ];

        let report = SynthesisEngine::new(&registry).synthesize(&profile(), &runs);
        assert_eq!(report.section("executive").unwrap().summary, "final");
    }

    #[test]
    fn test_custom_mapping_table() {
        let engine = SynthesisEngine::default().with_mapping(MappingTable::new(vec![
            MappingRule::new("forward", "market", &["outlook"], &[]),
        ]));
        let runs = vec![completed("market", json!({"summary": "s", "outlook": "bullish"}))];

        let report = engine.synthesize(&profile(), &runs);
        assert_eq!(report.section("forward").unwrap().summary, "bullish");
        assert!(report.section("market").unwrap().is_placeholder());
    }
}
