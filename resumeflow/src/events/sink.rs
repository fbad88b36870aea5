//! Event sink trait and implementations.

use super::EventType;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn, Level};

/// Receives lifecycle events.
///
/// Emission must never fail the job: implementations swallow and log their
/// own errors.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    ///
    /// # Arguments
    ///
    /// * `event` - The event type
    /// * `data` - Event payload, always carrying `job_id`
    async fn emit(&self, event: EventType, data: Value);
}

/// A no-op event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: EventType, _data: Value) {}
}

/// Forwards events to `tracing`.
///
/// Failure events (`step.retrying`, `step.fallback`, `step.failed`) are
/// always logged at warn; the rest at the configured level.
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
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: EventType, data: &Value) {
        let failure = matches!(
            event,
            EventType::StepRetrying | EventType::StepFallback | EventType::StepFailed
        );
        if failure {
            warn!(event_type = %event, event_data = %data, "Event: {}", event);
        } else if self.level == Level::DEBUG {
            debug!(event_type = %event, event_data = %data, "Event: {}", event);
        } else {
            info!(event_type = %event, event_data = %data, "Event: {}", event);
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: EventType, data: Value) {
        self.log_event(event, &data);
    }
}

/// Stores events in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(EventType, Value)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(EventType, Value)> {
        self.events.read().clone()
    }

    /// Returns the collected event types, in order.
    #[must_use]
    pub fn types(&self) -> Vec<EventType> {
        self.events.read().iter().map(|(t, _)| *t).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the payloads of events of one type.
    #[must_use]
    pub fn events_of_type(&self, event: EventType) -> Vec<Value> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| *t == event)
            .map(|(_, data)| data.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: EventType, data: Value) {
        self.events.write().push((event, data));
    }
}
