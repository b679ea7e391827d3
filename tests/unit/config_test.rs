//! Tests for configuration validation

use std::time::Duration;

use apply_dispatch::config::{
    AlertPolicy, QueueConfig, RateLimitConfig, RetryConfig, SchedulerConfig,
};
use apply_dispatch::util::{QueueName, SubscriptionTier};

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
    assert_eq!(cfg.circuit_breaker.success_threshold, 2);
    assert_eq!(cfg.rate_limit.window_secs, 60);
    assert_eq!(cfg.retry.max_attempts, 3);
    assert_eq!(cfg.alerts.policy, AlertPolicy::Continuous);
}

#[test]
fn test_queue_config_invalid_concurrency() {
    let invalid = QueueConfig {
        concurrency: 0,
        task_timeout_secs: 60,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_queue_config_invalid_timeout() {
    let invalid = QueueConfig {
        concurrency: 3,
        task_timeout_secs: 0,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_named_queue_overrides_default() {
    let linkedin = QueueName::platform("linkedin");
    let cfg = SchedulerConfig::default().with_queue(
        &linkedin,
        QueueConfig {
            concurrency: 5,
            task_timeout_secs: 120,
        },
    );
    assert_eq!(cfg.queue(&linkedin).concurrency, 5);
    assert_eq!(cfg.queue(&linkedin).task_timeout(), Duration::from_secs(120));
    assert_eq!(cfg.queue(&QueueName::General).concurrency, 3);
}

#[test]
fn test_invalid_named_queue_rejected() {
    let cfg = SchedulerConfig::default().with_queue(
        &QueueName::General,
        QueueConfig {
            concurrency: 0,
            task_timeout_secs: 10,
        },
    );
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("general"));
}

#[test]
fn test_rate_limit_points_scale_with_tier() {
    let mut cfg = RateLimitConfig::default();
    cfg.platform_points.insert("linkedin".into(), 50);
    assert_eq!(cfg.max_points("linkedin", SubscriptionTier::Free), 50);
    assert_eq!(cfg.max_points("linkedin", SubscriptionTier::Pro), 100);
    assert_eq!(cfg.max_points("linkedin", SubscriptionTier::Premium), 150);
    assert_eq!(cfg.max_points("indeed", SubscriptionTier::Pro), 200);
}

#[test]
fn test_decreasing_tier_multipliers_rejected() {
    let mut cfg = RateLimitConfig::default();
    cfg.tier_multipliers.premium = 1;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_backoff_doubles_and_caps() {
    let retry = RetryConfig {
        max_attempts: 10,
        base_delay_ms: 1_000,
        max_delay_ms: 5_000,
    };
    assert_eq!(retry.backoff_delay(1), Duration::from_millis(1_000));
    assert_eq!(retry.backoff_delay(2), Duration::from_millis(2_000));
    assert_eq!(retry.backoff_delay(3), Duration::from_millis(4_000));
    assert_eq!(retry.backoff_delay(4), Duration::from_millis(5_000));
    assert_eq!(retry.backoff_delay(200), Duration::from_millis(5_000));
}

#[test]
fn test_from_json_partial_sections() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "queues": { "linkedin": { "concurrency": 2, "task_timeout_secs": 30 } },
            "circuit_breaker": { "failure_threshold": 3 },
            "alerts": { "policy": "edge_triggered" }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.queue(&QueueName::platform("linkedin")).concurrency, 2);
    assert_eq!(cfg.circuit_breaker.failure_threshold, 3);
    assert_eq!(cfg.circuit_breaker.success_threshold, 2);
    assert_eq!(cfg.alerts.policy, AlertPolicy::EdgeTriggered);
}

#[test]
fn test_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{ "retry": { "max_attempts": 0 } }"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}
