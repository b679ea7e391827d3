//! Tests for error types

use apply_dispatch::core::{AdapterError, AdmissionDenial, SchedulerError, StoreError, TaskStatus};
use apply_dispatch::util::new_task_id;

#[test]
fn test_rate_limited_denial() {
    let err: SchedulerError = AdmissionDenial::RateLimited {
        platform: "indeed".to_string(),
        user_id: "u1".to_string(),
        reset_in_secs: 42,
    }
    .into();
    assert!(err.is_admission_denied());
    assert_eq!(
        format!("{err}"),
        "admission denied: rate limited on indeed for user u1; resets in 42s"
    );
}

#[test]
fn test_circuit_open_denial() {
    let err: SchedulerError = AdmissionDenial::CircuitOpen {
        platform: "linkedin".to_string(),
        retry_at_ms: Some(1_000),
    }
    .into();
    assert!(err.is_admission_denied());
    assert_eq!(format!("{err}"), "admission denied: circuit open for linkedin");
}

#[test]
fn test_denial_serializes_with_reason_tag() {
    let denial = AdmissionDenial::CircuitOpen {
        platform: "linkedin".to_string(),
        retry_at_ms: None,
    };
    let json = serde_json::to_value(&denial).unwrap();
    assert_eq!(json["reason"], "circuit_open");
    assert_eq!(json["platform"], "linkedin");
}

#[test]
fn test_non_admission_errors() {
    let id = new_task_id();
    assert!(!SchedulerError::TaskNotFound(id).is_admission_denied());
    let err = SchedulerError::InvalidState {
        id,
        status: TaskStatus::Completed,
    };
    assert!(!err.is_admission_denied());
}

#[test]
fn test_store_error_converts() {
    let err: SchedulerError = StoreError::Unavailable("redis down".to_string()).into();
    assert!(format!("{err}").contains("redis down"));
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{err}"), "backend error: connection failed");
}

#[test]
fn test_adapter_error_messages() {
    assert_eq!(
        AdapterError::Transient("timeout".into()).to_string(),
        "transient failure: timeout"
    );
    assert_eq!(
        AdapterError::Rejected("captcha".into()).to_string(),
        "rejected by platform: captcha"
    );
}
