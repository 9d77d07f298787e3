//! Report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The section names every report contains.
pub const CANONICAL_SECTIONS: [&str; 6] = [
    "executive",
    "competitive",
    "market",
    "regulatory",
    "media",
    "forward",
];

/// Where a section's content came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionSource {
    /// Taken as-is from a synthesis stage.
    Synthesis {
        /// The synthesis stage.
        stage_id: String,
    },
    /// Built by a mapping rule from a stage's raw findings.
    Mapped {
        /// The analysis stage.
        stage_id: String,
    },
    /// No usable data was available.
    Placeholder,
}

/// One entry in a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionItem {
    /// Headline of the entry.
    pub title: String,
    /// Supporting detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Remaining scalar fields of the source object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl SectionItem {
    /// Creates an item with only a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Content of one canonical section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionContent {
    /// Short prose summary.
    pub summary: String,
    /// Itemized findings.
    #[serde(default)]
    pub items: Vec<SectionItem>,
    /// Provenance.
    pub source: SectionSource,
}

impl SectionContent {
    /// The content used when a section has no usable data.
    #[must_use]
    pub fn placeholder(section: &str) -> Self {
        Self {
            summary: format!("{section} analysis pending"),
            items: Vec::new(),
            source: SectionSource::Placeholder,
        }
    }

    /// Returns true for placeholder content.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.source == SectionSource::Placeholder
    }

    fn mentions(&self, needle: &str) -> bool {
        let hit = |text: &str| text.to_lowercase().contains(needle);
        hit(&self.summary)
            || self.items.iter().any(|item| {
                hit(&item.title)
                    || item.detail.as_deref().is_some_and(hit)
                    || item
                        .attributes
                        .values()
                        .any(|v| v.as_str().is_some_and(hit))
            })
    }
}

/// Report-level bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Stages that completed.
    pub stages_completed: usize,
    /// Stages that failed.
    pub stages_failed: usize,
    /// Sum of the elapsed time of every terminal stage.
    pub duration_seconds: f64,
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
}

/// The final strategic report. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisReport {
    /// Entity key.
    pub entity_key: String,
    /// Entity display name.
    pub entity_name: String,
    /// Canonical section name to content. Always holds every canonical name.
    pub sections: BTreeMap<String, SectionContent>,
    /// Bookkeeping.
    pub metadata: ReportMetadata,
}

impl SynthesisReport {
    /// Returns a section by name.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&SectionContent> {
        self.sections.get(name)
    }

    /// Returns the sections in canonical order.
    pub fn ordered_sections(&self) -> impl Iterator<Item = (&'static str, &SectionContent)> {
        CANONICAL_SECTIONS
            .iter()
            .filter_map(|name| self.sections.get(*name).map(|content| (*name, content)))
    }

    /// Returns true if `section` mentions `text` anywhere, ignoring case.
    #[must_use]
    pub fn section_mentions(&self, section: &str, text: &str) -> bool {
        let needle = text.to_lowercase();
        self.section(section)
            .is_some_and(|content| content.mentions(&needle))
    }

    /// Names of the sections that fell back to a placeholder.
    #[must_use]
    pub fn placeholder_sections(&self) -> Vec<&'static str> {
        self.ordered_sections()
            .filter(|(_, content)| content.is_placeholder())
            .map(|(name, _)| name)
            .collect()
    }
}
