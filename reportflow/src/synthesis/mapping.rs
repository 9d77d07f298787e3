//! Declarative mapping from raw stage results to sections.
//!
//! Every shape variation a provider is known to produce is described by the
//! field candidates of a rule. The engine itself has no per-stage code.

use super::SectionItem;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys tried, in order, for an item's title.
pub const TITLE_KEYS: [&str; 8] = [
    "entity",
    "name",
    "title",
    "competitor",
    "outlet",
    "regulator",
    "headline",
    "label",
];

/// Keys tried, in order, for an item's detail.
pub const DETAIL_KEYS: [&str; 7] = [
    "action",
    "description",
    "detail",
    "summary",
    "impact",
    "sentiment",
    "status",
];

/// Maps one stage's result onto one section.
///
/// Field candidates may be dotted paths (`analysis.summary`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Target canonical section.
    pub section: String,
    /// Source stage id.
    pub stage_id: String,
    /// Candidate fields for the summary string, first match wins.
    pub summary_fields: Vec<String>,
    /// Candidate fields for the item list, first array wins.
    pub item_fields: Vec<String>,
}

impl MappingRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(section: &str, stage_id: &str, summary_fields: &[&str], item_fields: &[&str]) -> Self {
        Self {
            section: section.to_string(),
            stage_id: stage_id.to_string(),
            summary_fields: summary_fields.iter().map(|f| (*f).to_string()).collect(),
            item_fields: item_fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    /// Applies the rule to a stage result.
    ///
    /// Yields `None` unless a summary or at least one item can be found. A
    /// bare string result is taken as the summary. Without a summary field the
    /// summary is derived from the leading items.
    #[must_use]
    pub fn apply(&self, result: &Value) -> Option<(String, Vec<SectionItem>)> {
        if let Some(text) = non_empty_str(result) {
            return Some((text.to_string(), Vec::new()));
        }

        let items: Vec<SectionItem> = self
            .item_fields
            .iter()
            .find_map(|field| lookup(result, field).and_then(Value::as_array))
            .map(|list| list.iter().filter_map(project_item).collect())
            .unwrap_or_default();

        let summary = self
            .summary_fields
            .iter()
            .find_map(|field| lookup(result, field).and_then(non_empty_str));

        match summary {
            Some(summary) => Some((summary.to_string(), items)),
            None if !items.is_empty() => Some((derive_summary(&items), items)),
            None => None,
        }
    }
}

/// Number of item headlines folded into a derived summary.
const DERIVED_SUMMARY_ITEMS: usize = 3;

fn derive_summary(items: &[SectionItem]) -> String {
    let headlines: Vec<String> = items
        .iter()
        .take(DERIVED_SUMMARY_ITEMS)
        .map(|item| match &item.detail {
            Some(detail) => format!("{}: {detail}", item.title),
            None => item.title.clone(),
        })
        .collect();

    let mut summary = headlines.join("; ");
    if items.len() > DERIVED_SUMMARY_ITEMS {
        summary.push_str(&format!(" (+{} more)", items.len() - DERIVED_SUMMARY_ITEMS));
    }
    summary
}

/// Ordered list of mapping rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTable {
    rules: Vec<MappingRule>,
}

impl MappingTable {
    /// Creates a table from explicit rules.
    #[must_use]
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    /// The rules for the standard stage catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            MappingRule::new(
                "executive",
                "synthesis",
                &["executive_summary", "summary", "overview"],
                &["key_findings", "highlights", "recommendations"],
            ),
            MappingRule::new(
                "competitive",
                "competitive",
                &["summary", "overview", "landscape", "analysis.summary"],
                &["competitor_actions", "competitors", "threats", "items", "analysis.items"],
            ),
            MappingRule::new(
                "market",
                "market",
                &["summary", "overview", "market_summary", "analysis.summary"],
                &["trends", "drivers", "signals", "items", "analysis.items"],
            ),
            MappingRule::new(
                "regulatory",
                "regulatory",
                &["summary", "overview", "analysis.summary"],
                &["regulations", "risks", "items", "analysis.items"],
            ),
            MappingRule::new(
                "media",
                "media",
                &["summary", "sentiment_summary", "overview", "analysis.summary"],
                &["coverage", "articles", "mentions", "items", "analysis.items"],
            ),
            MappingRule::new(
                "forward",
                "forward",
                &["summary", "outlook", "overview", "analysis.summary"],
                &["scenarios", "recommendations", "items", "analysis.items"],
            ),
        ])
    }

    /// Returns the rules targeting `section`, in table order.
    pub fn rules_for<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a MappingRule> + 'a {
        self.rules.iter().filter(move |rule| rule.section == section)
    }

    /// Returns every rule.
    #[must_use]
    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Projects one raw list entry onto a [`SectionItem`].
///
/// Strings become titles. Objects need one of [`TITLE_KEYS`]; those without
/// are dropped. Anything else is dropped.
#[must_use]
pub fn project_item(value: &Value) -> Option<SectionItem> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| SectionItem::new(text))
        }
        Value::Object(map) => {
            let (title_key, title) = TITLE_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(non_empty_str).map(|t| (*key, t)))?;
            let detail = DETAIL_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(non_empty_str).map(|d| (*key, d)));

            let attributes: BTreeMap<String, Value> = map
                .iter()
                .filter(|(key, value)| {
                    key.as_str() != title_key
                        && detail.map_or(true, |(detail_key, _)| key.as_str() != detail_key)
                        && is_scalar(value)
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();

            Some(SectionItem {
                title: title.to_string(),
                detail: detail.map(|(_, d)| d.to_string()),
                attributes,
            })
        }
        _ => None,
    }
}

/// Resolves a dotted path inside a JSON value.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}
