//! Tests for audit sink

use skill_registry::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event("U1", "TEC80", AuditAction::Reserve, Some("1/5".into()));
    sink.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].holder, "U1");
    assert_eq!(events[0].resource, "TEC80");
    assert_eq!(events[0].action, AuditAction::Reserve);
    assert_eq!(events[0].detail.as_deref(), Some("1/5"));
    assert!(!events[0].event_id.is_empty());
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    for code in ["A", "B", "C"] {
        sink.record(build_audit_event("U1", code, AuditAction::Rollback, None));
    }

    let resources: Vec<String> = sink.events().into_iter().map(|e| e.resource).collect();
    assert_eq!(resources, ["B", "C"]);
}

#[test]
fn test_action_names() {
    assert_eq!(AuditAction::RollbackFailed.as_str(), "rollback-failed");
    assert_eq!(AuditAction::Register.as_str(), "register");
}
