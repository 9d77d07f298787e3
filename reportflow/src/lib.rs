//! # Reportflow
//!
//! Resumable multi-stage analysis pipeline that turns an entity profile into a
//! six-section strategic report.
//!
//! Reportflow provides:
//!
//! - **Ordered stages**: a fixed catalog run strictly in order, each stage
//!   seeing the completed results of the stages before it
//! - **Resume and single-flight**: at most one active run per entity key,
//!   picking up after the last persisted completed stage
//! - **Failure tolerance**: failed or timed-out stages are recorded and the
//!   run moves on
//! - **Shape-tolerant synthesis**: heterogeneous stage output is mapped onto
//!   canonical sections, with placeholders where data is missing
//! - **Progress**: polling and watch-channel subscriptions per entity
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reportflow::prelude::*;
//! use std::sync::Arc;
//!
//! let orchestrator = Orchestrator::builder(provider, Arc::new(InMemoryPersistence::new()))
//!     .with_config(PipelineConfig::from_env()?)
//!     .build()?;
//!
//! orchestrator.start_pipeline(EntityProfile::new("Acme Corp", "software")).await?;
//! let progress = orchestrator.wait("acme-corp").await;
//! let report = orchestrator.report("acme-corp");
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod executor;
pub mod observability;
pub mod persistence;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod registry;
pub mod synthesis;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{LoggingConfig, PipelineConfig};
    pub use crate::context::{ContextAccumulator, RequestPayload};
    pub use crate::core::{
        ControllerState, EntityProfile, PipelineStatus, StageRun, StageRunStatus, Stakeholders,
    };
    pub use crate::errors::{
        FatalConfigError, PersistenceError, ReportflowError, StageFailureKind,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::{StageExecution, StageExecutor};
    pub use crate::observability::init_tracing;
    pub use crate::persistence::{FilePersistence, InMemoryPersistence, PersistenceAdapter};
    pub use crate::pipeline::{Orchestrator, OrchestratorBuilder, PipelineRun, StartOutcome};
    pub use crate::progress::{ProgressReporter, ProgressView};
    pub use crate::provider::{AnalysisProvider, ProviderResult};
    #[cfg(feature = "http")]
    pub use crate::provider::{HttpAnalysisProvider, HttpProviderConfig};
    pub use crate::registry::{StageDefinition, StageKind, StageRegistry};
    pub use crate::synthesis::{
        SectionContent, SectionItem, SectionSource, SynthesisEngine, SynthesisReport,
        CANONICAL_SECTIONS,
    };
}
