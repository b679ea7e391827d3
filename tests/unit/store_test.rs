//! Tests for state store backends

use std::path::PathBuf;
use std::sync::Arc;

use apply_dispatch::config::CircuitBreakerConfig;
use apply_dispatch::core::{
    CircuitBreakerRegistry, CircuitRecord, CircuitState, CircuitStore, RateLimiter, StoreError,
};
use apply_dispatch::infra::{FileCircuitStore, InMemoryStateStore};
use apply_dispatch::util::SubscriptionTier;

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("apply-dispatch-{name}-{}", uuid::Uuid::new_v4()))
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = temp_dir("circuits");
    let config = CircuitBreakerConfig {
        failure_threshold: 2,
        ..CircuitBreakerConfig::default()
    };
    {
        let store = Arc::new(FileCircuitStore::open(&dir, "circuits").unwrap());
        let registry = CircuitBreakerRegistry::new(config.clone(), store);
        registry.record_failure("indeed", 1_000);
        registry.record_failure("indeed", 2_000);
        assert!(registry.is_open("indeed", 2_000));
    }

    let store = Arc::new(FileCircuitStore::open(&dir, "circuits").unwrap());
    assert_eq!(store.platforms().unwrap(), vec!["indeed".to_string()]);
    let registry = CircuitBreakerRegistry::new(config.clone(), store);
    let record = registry.get_status("indeed", 2_500);
    assert_eq!(record.state, CircuitState::Open);
    assert_eq!(record.next_reset_at_ms, Some(2_000 + u128::from(config.reset_timeout_ms)));
    assert_eq!(
        registry.get_status("indeed", 2_000 + u128::from(config.reset_timeout_ms)).state,
        CircuitState::HalfOpen
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn test_file_store_reset_persists_closed_record() {
    let dir = temp_dir("reset");
    {
        let store = Arc::new(FileCircuitStore::open(&dir, "circuits").unwrap());
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), store);
        registry.record_failure("linkedin", 10);
        assert!(registry.reset("linkedin"));
    }
    let store = FileCircuitStore::open(&dir, "circuits").unwrap();
    let record = store.load("linkedin").unwrap().unwrap();
    assert_eq!(record.state, CircuitState::Closed);
    assert_eq!(record.failures, 0);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn test_file_store_keeps_last_persisted_record_when_write_fails() {
    let dir = temp_dir("write-fail");
    let config = CircuitBreakerConfig::default();
    let store = FileCircuitStore::open(&dir, "circuits").unwrap();
    let first = store
        .modify("indeed", CircuitRecord::closed(&config), &mut |r| r.failures = 1)
        .unwrap();
    assert_eq!(first.failures, 1);

    // The backing directory disappearing makes every later write fail.
    std::fs::remove_dir_all(&dir).unwrap();
    let err = store.modify("indeed", CircuitRecord::closed(&config), &mut |r| r.failures = 2);
    assert!(matches!(err, Err(StoreError::Io(_))));
    assert_eq!(store.load("indeed").unwrap().unwrap().failures, 1);

    let err = store.modify("linkedin", CircuitRecord::closed(&config), &mut |r| r.failures = 1);
    assert!(err.is_err());
    assert!(store.load("linkedin").unwrap().is_none());
    assert_eq!(store.platforms().unwrap(), vec!["indeed".to_string()]);
}

#[test]
fn test_file_store_unchanged_record_skips_write() {
    let dir = temp_dir("noop");
    let config = CircuitBreakerConfig::default();
    let store = FileCircuitStore::open(&dir, "circuits").unwrap();
    store
        .modify("indeed", CircuitRecord::closed(&config), &mut |r| r.failures = 1)
        .unwrap();
    std::fs::remove_dir_all(&dir).unwrap();
    let same = store
        .modify("indeed", CircuitRecord::closed(&config), &mut |_| {})
        .unwrap();
    assert_eq!(same.failures, 1);
}

#[test]
fn test_expired_rate_limit_windows_are_dropped() {
    let store = Arc::new(InMemoryStateStore::new());
    let config = apply_dispatch::config::RateLimitConfig::default();
    let window_ms = u128::from(config.window_secs) * 1_000;
    let limiter = RateLimiter::new(config, store);
    for user in 0..1_000 {
        assert!(limiter.consume("indeed", &format!("u{user}"), SubscriptionTier::Free, 0).allowed);
    }
    assert_eq!(limiter.purge_expired(window_ms - 1), 0);
    assert_eq!(limiter.purge_expired(window_ms), 1_000);
    assert_eq!(limiter.purge_expired(window_ms), 0);
}

#[test]
fn test_file_store_failure_keeps_breaker_state_consistent() {
    let dir = temp_dir("breaker-write-fail");
    let config = CircuitBreakerConfig {
        failure_threshold: 1,
        ..CircuitBreakerConfig::default()
    };
    let store = Arc::new(FileCircuitStore::open(&dir, "circuits").unwrap());
    let registry = CircuitBreakerRegistry::new(config, store.clone());
    std::fs::remove_dir_all(&dir).unwrap();

    registry.record_failure("indeed", 0);
    assert!(store.load("indeed").unwrap().is_none());
    assert!(!registry.is_open("indeed", 0));
}

#[test]
fn test_breaker_fails_open_when_store_down() {
    let store = Arc::new(InMemoryStateStore::new());
    let config = CircuitBreakerConfig {
        failure_threshold: 1,
        ..CircuitBreakerConfig::default()
    };
    let registry = CircuitBreakerRegistry::new(config, store.clone());
    registry.record_failure("indeed", 0);
    assert!(registry.is_open("indeed", 0));

    store.set_available(false);
    assert!(!registry.is_open("indeed", 0));
    assert_eq!(registry.get_status("indeed", 0).state, CircuitState::Closed);
}

#[test]
fn test_rate_limiter_fails_open_when_store_down() {
    let store = Arc::new(InMemoryStateStore::new());
    let mut config = apply_dispatch::config::RateLimitConfig::default();
    config.default_points = 1;
    let limiter = RateLimiter::new(config, store.clone());
    assert!(limiter.consume("indeed", "u1", SubscriptionTier::Free, 0).allowed);
    assert!(!limiter.consume("indeed", "u1", SubscriptionTier::Free, 1).allowed);

    store.set_available(false);
    assert!(limiter.consume("indeed", "u1", SubscriptionTier::Free, 2).allowed);
}
