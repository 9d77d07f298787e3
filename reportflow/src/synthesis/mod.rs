//! Merges stage outputs into a canonical six-section report.
//!
//! Synthesis never fails. Each section is resolved in order from a pre-shaped
//! section emitted by a synthesis stage, then from the mapping table, and
//! finally falls back to a placeholder.

mod engine;
mod mapping;
mod report;

pub use engine::SynthesisEngine;
pub use mapping::{project_item, MappingRule, MappingTable, DETAIL_KEYS, TITLE_KEYS};
pub use report::{
    ReportMetadata, SectionContent, SectionItem, SectionSource, SynthesisReport,
    CANONICAL_SECTIONS,
};
