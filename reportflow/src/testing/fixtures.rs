//! Fixtures for pipeline tests.

use super::ScriptedProvider;
use crate::config::PipelineConfig;
use crate::core::{EntityProfile, Stakeholders};
use crate::registry::{StageDefinition, StageRegistry};
use serde_json::json;

/// The Acme Corp intake profile.
#[must_use]
pub fn acme_profile() -> EntityProfile {
    EntityProfile::new("Acme Corp", "Industrial automation software")
        .with_description("Mid-market vendor of factory scheduling software")
        .with_stakeholders(Stakeholders {
            competitors: vec!["Globex".to_string(), "Initech".to_string()],
            regulators: vec!["FTC".to_string()],
            partners: vec!["Hooli Cloud".to_string()],
            media_outlets: vec!["Industry Weekly".to_string()],
            customers: vec!["Tier-1 automotive suppliers".to_string()],
        })
        .with_attribute("headquarters", json!("Springfield"))
}

/// A competitive-stage result reporting Globex's price cut.
#[must_use]
pub fn globex_competitive_result() -> serde_json::Value {
    json!({
        "competitor_actions": [
            {"entity": "Globex", "action": "price cut"},
        ],
    })
}

/// A provider scripted with a plausible result for every standard stage.
#[must_use]
pub fn acme_provider() -> ScriptedProvider {
    ScriptedProvider::new()
        .with_success(
            "market",
            json!({
                "overview": "Factory software demand is growing 9% a year",
                "trends": ["reshoring", {"label": "AI scheduling", "impact": "high"}],
            }),
        )
        .with_success("competitive", globex_competitive_result())
        .with_success(
            "media",
            json!({
                "sentiment_summary": "Coverage is mostly neutral",
                "coverage": [{"outlet": "Industry Weekly", "headline": "Acme expands EMEA", "sentiment": "positive"}],
            }),
        )
        .with_success(
            "regulatory",
            json!({
                "analysis": {
                    "summary": "No pending rules target scheduling software",
                    "items": [{"regulator": "FTC", "status": "monitoring"}],
                },
            }),
        )
        .with_success(
            "forward",
            json!({
                "outlook": "Defend EMEA share while Globex discounts",
                "scenarios": [{"name": "Price war", "description": "Match Globex within two quarters"}],
            }),
        )
        .with_success(
            "synthesis",
            json!({
                "executive_summary": "Acme holds share but faces price pressure from Globex",
                "key_findings": ["Globex price cut", "Demand growth intact"],
            }),
        )
}

/// The standard stage catalog with every nominal duration set to `seconds`.
#[must_use]
pub fn fast_registry(seconds: f64) -> StageRegistry {
    let stages: Vec<StageDefinition> = StageRegistry::standard()
        .stages()
        .iter()
        .cloned()
        .map(|mut stage| {
            stage.nominal_duration_seconds = seconds;
            stage
        })
        .collect();
    StageRegistry::new(stages).unwrap_or_default()
}

/// Ids of the standard stages in order.
#[must_use]
pub fn standard_stage_ids() -> Vec<&'static str> {
    vec!["market", "competitive", "media", "regulatory", "forward", "synthesis"]
}

/// Configuration used by the integration tests.
#[must_use]
pub fn test_config() -> PipelineConfig {
    PipelineConfig::default()
}
