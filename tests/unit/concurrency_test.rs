//! Tests for atomic read-modify-write under contention

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use apply_dispatch::config::{CircuitBreakerConfig, RateLimitConfig, SchedulerConfig};
use apply_dispatch::core::{
    AdmissionDenial, CircuitBreakerRegistry, CircuitState, EnqueueOptions, JobQueue, RateLimiter,
    SchedulerError, SearchPayload, TaskPayload,
};
use apply_dispatch::infra::InMemoryStateStore;
use apply_dispatch::util::{QueueName, SubscriptionTier};

const THREADS: u32 = 8;
const CALLS_PER_THREAD: u32 = 50;

#[test]
fn test_concurrent_consume_admits_exactly_quota() {
    let config = RateLimitConfig {
        default_points: 200,
        ..RateLimitConfig::default()
    };
    let limiter = RateLimiter::new(config, Arc::new(InMemoryStateStore::new()));
    let admitted = AtomicU32::new(0);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..CALLS_PER_THREAD {
                    if limiter.consume("linkedin", "u1", SubscriptionTier::Free, 1_000).allowed {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    assert_eq!(admitted.load(Ordering::Relaxed), 200);
    let status = limiter.status("linkedin", "u1", SubscriptionTier::Free, 1_000);
    assert_eq!(status.points, 200);
    assert_eq!(status.remaining, 0);
    assert!(!status.allowed);
}

#[test]
fn test_concurrent_failures_are_all_counted() {
    let config = CircuitBreakerConfig {
        failure_threshold: 3,
        ..CircuitBreakerConfig::default()
    };
    let registry = CircuitBreakerRegistry::new(config, Arc::new(InMemoryStateStore::new()));

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..CALLS_PER_THREAD {
                    registry.record_failure("indeed", 500);
                }
            });
        }
    });

    let record = registry.get_status("indeed", 500);
    assert_eq!(record.total_failures, u64::from(THREADS * CALLS_PER_THREAD));
    assert_eq!(record.consecutive_failures, THREADS * CALLS_PER_THREAD);
    assert_eq!(record.state, CircuitState::Open);
}

#[test]
fn test_concurrent_submissions_respect_quota() {
    let mut config = SchedulerConfig::default();
    config.rate_limit.default_points = 200;
    let store = Arc::new(InMemoryStateStore::new());
    let breaker = Arc::new(CircuitBreakerRegistry::new(
        config.circuit_breaker.clone(),
        store.clone(),
    ));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), store));
    let queue = JobQueue::new(config, breaker, limiter);
    let denied = AtomicU32::new(0);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..CALLS_PER_THREAD {
                    let result = queue.enqueue(
                        "glassdoor",
                        TaskPayload::Search(SearchPayload::default()),
                        EnqueueOptions::for_user("u1"),
                        SubscriptionTier::Free,
                        0,
                    );
                    match result {
                        Ok(_) => {}
                        Err(SchedulerError::AdmissionDenied(AdmissionDenial::RateLimited { .. })) => {
                            denied.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }
    });

    assert_eq!(denied.load(Ordering::Relaxed), 200);
    assert_eq!(queue.counts(&QueueName::platform("glassdoor"), 0).waiting, 200);
}
