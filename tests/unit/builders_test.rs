//! Tests for builder modules

use std::sync::Arc;

use async_trait::async_trait;
use apply_dispatch::builders::SchedulerBuilder;
use apply_dispatch::config::SchedulerConfig;
use apply_dispatch::core::{AdapterError, PlatformAdapter, SchedulerError, Task, TaskOutput};
use apply_dispatch::runtime::TokioSpawner;

struct NoopAdapter;

#[async_trait]
impl PlatformAdapter for NoopAdapter {
    async fn execute(&self, _task: &Task) -> Result<TaskOutput, AdapterError> {
        Ok(serde_json::Value::Null)
    }
}

#[test]
fn test_builder_requires_adapter() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let err = SchedulerBuilder::new(SchedulerConfig::default())
        .build_with_spawner(TokioSpawner::new(runtime.handle().clone()))
        .err()
        .unwrap();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}

#[test]
fn test_builder_validates_config() {
    let mut config = SchedulerConfig::default();
    config.retry.max_attempts = 0;
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let err = SchedulerBuilder::new(config)
        .adapter(Arc::new(NoopAdapter))
        .build_with_spawner(TokioSpawner::new(runtime.handle().clone()))
        .err()
        .unwrap();
    assert!(matches!(err, SchedulerError::InvalidConfig(msg) if msg.contains("max_attempts")));
}

#[test]
fn test_build_outside_runtime_fails() {
    let err = SchedulerBuilder::new(SchedulerConfig::default())
        .adapter(Arc::new(NoopAdapter))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, SchedulerError::Backend(_)));
}

#[tokio::test]
async fn test_builder_keeps_config() {
    let mut config = SchedulerConfig::default();
    config.default_queue.concurrency = 4;
    let builder = SchedulerBuilder::new(config);
    assert_eq!(builder.config().default_queue.concurrency, 4);

    let scheduler = builder.adapter(Arc::new(NoopAdapter)).build().unwrap();
    assert_eq!(scheduler.config().default_queue.concurrency, 4);
    assert!(scheduler.health().ok);
}
