//! Tests for the audit sink

use apply_dispatch::core::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
use apply_dispatch::util::{new_task_id, QueueName};

#[test]
fn test_in_memory_sink_records_events() {
    let sink = InMemoryAuditSink::new(10);
    let task_id = new_task_id();
    sink.record(AuditEvent::new(
        Some(task_id),
        QueueName::platform("indeed"),
        "u1",
        AuditAction::Submitted,
        None,
    ));
    sink.record(AuditEvent::new(
        None,
        QueueName::platform("indeed"),
        "u2",
        AuditAction::Rejected,
        Some("circuit open for indeed".into()),
    ));

    assert_eq!(sink.events().len(), 2);
    let for_task = sink.events_for(task_id);
    assert_eq!(for_task.len(), 1);
    assert_eq!(for_task[0].action, AuditAction::Submitted);
    assert_eq!(for_task[0].user_id, "u1");
}

#[test]
fn test_audit_event_serializes_action() {
    let event = AuditEvent::new(None, QueueName::General, "u1", AuditAction::Retried, None);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "retried");
}
