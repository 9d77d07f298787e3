//! Event sink trait and implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Level};
use uuid::Uuid;

/// A single orchestrator event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event type (see [`super::types`]).
    pub event_type: String,
    /// The entity the run belongs to.
    pub entity_key: String,
    /// The run that emitted the event.
    pub run_id: Uuid,
    /// The stage involved, for stage events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    /// Additional payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    /// When the event was created.
    pub emitted_at: DateTime<Utc>,
}

impl PipelineEvent {
    /// Creates a run-level event.
    #[must_use]
    pub fn new(event_type: impl Into<String>, entity_key: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            event_type: event_type.into(),
            entity_key: entity_key.into(),
            run_id,
            stage_id: None,
            data: serde_json::Value::Null,
            emitted_at: Utc::now(),
        }
    }

    /// Attaches the stage id.
    #[must_use]
    pub fn with_stage(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Receives orchestrator events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: PipelineEvent);

    /// Emits an event without awaiting. Must never panic or block.
    fn try_emit(&self, event: PipelineEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: PipelineEvent) {}

    fn try_emit(&self, _event: PipelineEvent) {}
}

/// Writes events to the `tracing` pipeline.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &PipelineEvent) {
        let stage_id = event.stage_id.as_deref().unwrap_or("-");
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.event_type,
                entity_key = %event.entity_key,
                run_id = %event.run_id,
                stage_id,
                data = %event.data,
                "Event: {}", event.event_type
            );
        } else {
            info!(
                event_type = %event.event_type,
                entity_key = %event.entity_key,
                run_id = %event.run_id,
                stage_id,
                data = %event.data,
                "Event: {}", event.event_type
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: PipelineEvent) {
        self.log_event(&event);
    }
}

/// Keeps every event in memory. Used by tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the events with exactly the given type.
    #[must_use]
    pub fn of_type(&self, event_type: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Returns the stage ids of events with the given type, in emission order.
    #[must_use]
    pub fn stage_ids_of(&self, event_type: &str) -> Vec<String> {
        self.of_type(event_type)
            .into_iter()
            .filter_map(|event| event.stage_id)
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types;

    fn event(event_type: &str) -> PipelineEvent {
        PipelineEvent::new(event_type, "acme-corp", Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_events() {
        NoOpEventSink.emit(event(types::PIPELINE_STARTED)).await;
        LoggingEventSink::debug().try_emit(event(types::STAGE_STARTED).with_stage("market"));
        LoggingEventSink::default()
            .emit(event(types::STAGE_FAILED).with_data(serde_json::json!({"kind": "timeout"})))
            .await;
    }

    #[tokio::test]
    async fn test_collecting_sink_filters() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(event(types::STAGE_STARTED).with_stage("market")).await;
        sink.try_emit(event(types::STAGE_COMPLETED).with_stage("market"));
        sink.try_emit(event(types::STAGE_STARTED).with_stage("competitive"));

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.stage_ids_of(types::STAGE_STARTED),
            vec!["market".to_string(), "competitive".to_string()]
        );
        assert_eq!(sink.of_type(types::STAGE_COMPLETED).len(), 1);
    }

    #[test]
    fn test_event_serialization_omits_empty_fields() {
        let json = serde_json::to_value(event(types::PIPELINE_COMPLETED)).unwrap();

        assert!(json.get("stage_id").is_none());
        assert!(json.get("data").is_none());
        assert_eq!(json["event_type"], "pipeline.completed");
    }
}
