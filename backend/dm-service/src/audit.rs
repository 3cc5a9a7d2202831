//! Structured audit trail for limiter denials and moderation actions.

use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::ReportStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    RateLimited {
        scope: String,
        identifier: String,
        endpoint: String,
        method: String,
        retry_after: u64,
    },
    ReportSubmitted {
        report_id: Uuid,
        reporter_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    },
    ReportReviewed {
        report_id: Uuid,
        moderator_id: Uuid,
        from: ReportStatus,
        to: ReportStatus,
    },
    ReportContextViewed {
        report_id: Uuid,
        admin_id: Uuid,
        conversation_id: Uuid,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::RateLimited { .. } => "rate_limited",
            AuditEvent::ReportSubmitted { .. } => "report_submitted",
            AuditEvent::ReportReviewed { .. } => "report_reviewed",
            AuditEvent::ReportContextViewed { .. } => "report_context_viewed",
        }
    }
}

/// Fire-and-forget: implementations must not fail the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events as `tracing` records under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(detail) => tracing::info!(target: "audit", kind = event.kind(), %detail, "Audit event"),
            Err(e) => tracing::warn!(target: "audit", kind = event.kind(), error = %e, "Audit event not serializable"),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_serializes_with_tag() {
        let event = AuditEvent::RateLimited {
            scope: "user".into(),
            identifier: "42".into(),
            endpoint: "/api/v1/messages".into(),
            method: "POST".into(),
            retry_after: 12,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "rate_limited");
        assert_eq!(value["retry_after"], 12);
        assert_eq!(event.kind(), "rate_limited");
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemoryAuditSink::new();
        let id = Uuid::new_v4();
        sink.record(AuditEvent::ReportContextViewed {
            report_id: id,
            admin_id: id,
            conversation_id: id,
        });
        assert_eq!(sink.events().len(), 1);
    }
}
