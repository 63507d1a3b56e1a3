//! Audit sink implementations.
//!
//! Records the reservation lifecycle so a failed rollback can be found and
//! repaired by an operator.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// What happened to a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// One unit of a skill was reserved.
    Reserve,
    /// A previously reserved unit was returned.
    Rollback,
    /// Returning a unit failed; the counter may be over-incremented.
    RollbackFailed,
    /// The student's skill set was written.
    Register,
    /// A hidden skill was released from a student.
    Release,
}

impl AuditAction {
    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::Rollback => "rollback",
            Self::RollbackFailed => "rollback-failed",
            Self::Register => "register",
            Self::Release => "release",
        }
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Student matric number.
    pub holder: String,
    /// Skill code, or the joined code list for `Register`.
    pub resource: String,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink that forwards events to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&mut self, event: AuditEvent) {
        tracing::info!(
            target: "skill_registry::audit",
            event_id = %event.event_id,
            holder = %event.holder,
            resource = %event.resource,
            action = event.action.as_str(),
            detail = event.detail.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

/// A shared sink, so the caller can keep reading events it hands out.
impl<T: AuditSink + ?Sized> AuditSink for Arc<Mutex<T>> {
    fn record(&mut self, event: AuditEvent) {
        self.lock().record(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    holder: impl Into<String>,
    resource: impl Into<String>,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        holder: holder.into(),
        resource: resource.into(),
        action,
        created_at: Utc::now(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_drops_oldest() {
        let mut sink = InMemoryAuditSink::new(2);
        for resource in ["A", "B", "C"] {
            sink.record(build_audit_event("U1", resource, AuditAction::Reserve, None));
        }
        let resources: Vec<String> = sink.events().into_iter().map(|e| e.resource).collect();
        assert_eq!(resources, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_shared_sink_records_through_clone() {
        let shared = Arc::new(Mutex::new(InMemoryAuditSink::new(8)));
        let mut handle: Box<dyn AuditSink> = Box::new(Arc::clone(&shared));
        handle.record(build_audit_event("U1", "A", AuditAction::Rollback, None));
        assert_eq!(shared.lock().events()[0].action, AuditAction::Rollback);
    }
}
