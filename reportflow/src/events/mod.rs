//! Event emission for pipeline observability.
//!
//! Sinks are injected into the orchestrator; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};

/// Event type names emitted by the orchestrator.
pub mod types {
    /// A fresh run began checking persisted state.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// Persisted completed stages were adopted.
    pub const PIPELINE_RESUMED: &str = "pipeline.resumed";
    /// Every stage is terminal and the report was built.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// The run was cancelled externally.
    pub const PIPELINE_CANCELLED: &str = "pipeline.cancelled";
    /// The entity profile was rejected.
    pub const PIPELINE_ABORTED: &str = "pipeline.aborted";
    /// A stage call began.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage produced a result.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A terminal stage run could not be saved.
    pub const STAGE_PERSIST_FAILED: &str = "stage.persist_failed";
}
