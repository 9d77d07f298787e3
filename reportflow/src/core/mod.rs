//! Core domain model types for reportflow.
//!
//! This module contains the fundamental types shared by every component:
//! - Stage, pipeline and controller status enums
//! - The per-stage run record
//! - The entity profile supplied by intake

mod entity;
mod stage_run;
mod status;

pub use entity::{EntityProfile, Stakeholders};
pub use stage_run::StageRun;
pub use status::{ControllerState, PipelineStatus, StageRunStatus};
