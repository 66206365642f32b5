//! Tests for audit sink

use task_manager::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, TaskHash, TaskKey};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let event = build_audit_event(
        &TaskHash::from_hex("abc123"),
        &TaskKey::new("mail", "send"),
        AuditAction::Submitted,
        Some("deduplicated".to_string()),
    );

    sink.record(event);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].task_hash.as_str(), "abc123");
    assert_eq!(events[0].task, "mail.send");
    assert_eq!(events[0].action, AuditAction::Submitted);
    assert_eq!(events[0].detail.as_deref(), Some("deduplicated"));
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);
    for id in ["a", "b", "c"] {
        sink.record(build_audit_event(
            &TaskHash::from_hex(id),
            &TaskKey::new("mail", "send"),
            AuditAction::Launched,
            None,
        ));
    }
    assert_eq!(
        sink.hashes_for(AuditAction::Launched),
        vec![TaskHash::from_hex("b"), TaskHash::from_hex("c")]
    );
}
