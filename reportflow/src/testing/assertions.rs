//! Assertions over reports and progress views.

use crate::core::StageRunStatus;
use crate::progress::ProgressView;
use crate::synthesis::{SectionContent, SectionSource, SynthesisReport, CANONICAL_SECTIONS};

/// Asserts that the report holds every canonical section.
pub fn assert_all_sections_present(report: &SynthesisReport) {
    for section in CANONICAL_SECTIONS {
        assert!(
            report.section(section).is_some(),
            "Expected section '{}' in report, got {:?}",
            section,
            report.sections.keys().collect::<Vec<_>>()
        );
    }
    assert_eq!(report.sections.len(), CANONICAL_SECTIONS.len());
}

/// Asserts that a section is exactly the placeholder.
pub fn assert_placeholder(report: &SynthesisReport, section: &str) {
    assert_eq!(
        report.section(section),
        Some(&SectionContent::placeholder(section)),
        "Expected section '{}' to be the placeholder",
        section
    );
}

/// Asserts that a section was mapped from the given stage.
pub fn assert_mapped_from(report: &SynthesisReport, section: &str, stage_id: &str) {
    let source = report.section(section).map(|content| &content.source);
    assert_eq!(
        source,
        Some(&SectionSource::Mapped {
            stage_id: stage_id.to_string()
        }),
        "Expected section '{}' to be mapped from '{}'",
        section,
        stage_id
    );
}

/// Asserts a stage's status in a progress view.
pub fn assert_stage_status(view: &ProgressView, stage_id: &str, expected: StageRunStatus) {
    assert_eq!(
        view.stage_status(stage_id),
        Some(expected),
        "Expected stage '{}' to be {:?}",
        stage_id,
        expected
    );
}

/// Asserts that the view describes a stopped run.
pub fn assert_terminal(view: &ProgressView) {
    assert!(
        view.is_terminal(),
        "Expected a terminal run, got controller state {:?}",
        view.controller_state
    );
}
