//! Testing utilities for reportflow pipelines.
//!
//! This module provides:
//! - A scripted analysis provider that records every call
//! - A persistence wrapper with switchable failures and an operation log
//! - Profile, registry and response fixtures
//! - Assertions over reports and progress views

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_all_sections_present, assert_mapped_from, assert_placeholder, assert_stage_status,
    assert_terminal,
};
pub use fixtures::{
    acme_profile, acme_provider, fast_registry, globex_competitive_result, standard_stage_ids,
    test_config,
};
pub use mocks::{FlakyPersistence, RecordedCall, ScriptedProvider};
