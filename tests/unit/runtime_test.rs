//! Tests for tokio spawner utilities and API views

use apply_dispatch::core::{ApplyPayload, Spawn, Task, TaskPayload, TaskStatus};
use apply_dispatch::runtime::{TaskView, TokioSpawner};
use apply_dispatch::util::{new_task_id, Priority, QueueName};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_try_current_outside_runtime() {
    assert!(TokioSpawner::try_current().is_none());
}

fn apply_task(owner: &str) -> Task {
    Task {
        id: new_task_id(),
        platform: "linkedin".into(),
        queue: QueueName::platform("linkedin"),
        priority: Priority(5),
        payload: TaskPayload::Apply(ApplyPayload {
            job_id: "job-1".into(),
            ..ApplyPayload::default()
        }),
        attempts: 1,
        max_attempts: 3,
        status: TaskStatus::Completed,
        owner_user_id: owner.to_string(),
        created_at_ms: 1,
        last_attempt_at_ms: Some(2),
        available_at_ms: 1,
        finished_at_ms: Some(3),
        result: Some(serde_json::json!({ "applied": true })),
        error: None,
    }
}

#[test]
fn test_task_view_owner_sees_payload() {
    let task = apply_task("alice");
    let view = TaskView::for_viewer(&task, "alice");
    assert!(!view.is_redacted());
    assert_eq!(view.payload, Some(task.payload.clone()));
    assert_eq!(view.result, task.result);
}

#[test]
fn test_task_view_redacts_for_others() {
    let task = apply_task("alice");
    let view = TaskView::for_viewer(&task, "mallory");
    assert!(view.is_redacted());
    assert!(view.result.is_none());
    assert_eq!(view.status, TaskStatus::Completed);
    assert_eq!(view.attempts, 1);
}
