//! Pipeline runs and their orchestration.
//!
//! - [`PipelineRun`]: the per-entity run record
//! - [`Orchestrator`]: single-flight start, resume, restart and cancellation
//! - the run controller state machine that drives stages in order

mod controller;
mod orchestrator;
mod run;


pub use controller::CompletionCallback;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, StartOutcome};
pub use run::PipelineRun;
