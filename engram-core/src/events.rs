//! Event notification seam.
//!
//! The cross-agent event bus is an external collaborator; the core only
//! needs a `publish` call. Every call site is fire-and-forget: a bus
//! failure is logged and discarded, never surfaced to the caller.

use crate::error::EventError;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

/// Event type published after a successful mining pass.
pub const LEARNING_APPLIED: &str = "learning_applied";

/// Severity of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Sink for best-effort event notifications.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        source: &str,
        event_type: &str,
        payload: Value,
        severity: Severity,
        summary: &str,
    ) -> Result<(), EventError>;
}

/// Sink that discards everything, for callers without a bus.
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(
        &self,
        _source: &str,
        _event_type: &str,
        _payload: Value,
        _severity: Severity,
        _summary: &str,
    ) -> Result<(), EventError> {
        Ok(())
    }
}

/// Publish without letting a bus failure reach the caller.
pub async fn publish_best_effort(
    sink: &dyn EventSink,
    source: &str,
    event_type: &str,
    payload: Value,
    severity: Severity,
    summary: &str,
) {
    if let Err(e) = sink.publish(source, event_type, payload, severity, summary).await {
        warn!(source, event_type, error = %e, "event publish failed; continuing");
    }
}
