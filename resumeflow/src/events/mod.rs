//! Machine-readable lifecycle events.
//!
//! Sinks receive one event per executor decision alongside the `tracing`
//! log lines. A sink is handed to the executor explicitly; there is no
//! process-wide default.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle event types emitted by the executor and step runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A pending job began processing.
    #[serde(rename = "job.started")]
    JobStarted,
    /// A job with completed steps was picked up again.
    #[serde(rename = "job.resumed")]
    JobResumed,
    /// A step attempt is about to run.
    #[serde(rename = "step.started")]
    StepStarted,
    /// A step attempt failed and will be retried after a backoff.
    #[serde(rename = "step.retrying")]
    StepRetrying,
    /// A fallback result was substituted for a step.
    #[serde(rename = "step.fallback")]
    StepFallback,
    /// A step produced a result.
    #[serde(rename = "step.completed")]
    StepCompleted,
    /// A step failed permanently.
    #[serde(rename = "step.failed")]
    StepFailed,
    /// A job reached a terminal status.
    #[serde(rename = "job.completed")]
    JobCompleted,
}

impl EventType {
    /// Every event type.
    pub const ALL: [Self; 8] = [
        Self::JobStarted,
        Self::JobResumed,
        Self::StepStarted,
        Self::StepRetrying,
        Self::StepFallback,
        Self::StepCompleted,
        Self::StepFailed,
        Self::JobCompleted,
    ];

    /// The dotted wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JobStarted => "job.started",
            Self::JobResumed => "job.resumed",
            Self::StepStarted => "step.started",
            Self::StepRetrying => "step.retrying",
            Self::StepFallback => "step.fallback",
            Self::StepCompleted => "step.completed",
            Self::StepFailed => "step.failed",
            Self::JobCompleted => "job.completed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde() {
        for event in EventType::ALL {
            let value = serde_json::to_value(event).unwrap();
            assert_eq!(value, serde_json::json!(event.as_str()));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(EventType::StepFallback.to_string(), "step.fallback");
    }
}
