//! Tests for utility functions

use std::time::Duration;

use apply_dispatch::util::{after, new_task_id, now_ms, secs_until, Priority, QueueName, SubscriptionTier};

#[test]
fn test_priority_ordering() {
    assert!(Priority::URGENT < Priority(1));
    assert!(Priority(1) < Priority(10));
    assert_eq!(Priority::from(7).value(), 7);
}

#[test]
fn test_tier_default_priorities() {
    assert_eq!(SubscriptionTier::default(), SubscriptionTier::Free);
    assert_eq!(SubscriptionTier::Free.default_priority(), Priority(10));
    assert_eq!(SubscriptionTier::Pro.default_priority(), Priority(5));
    assert_eq!(SubscriptionTier::Premium.default_priority(), Priority(1));
}

#[test]
fn test_tier_serde_names() {
    let json = serde_json::to_string(&SubscriptionTier::Premium).unwrap();
    assert_eq!(json, "\"premium\"");
    let tier: SubscriptionTier = serde_json::from_str("\"pro\"").unwrap();
    assert_eq!(tier, SubscriptionTier::Pro);
}

#[test]
fn test_queue_name_keys() {
    assert_eq!(QueueName::General.key(), "general");
    assert_eq!(QueueName::platform("glassdoor").key(), "glassdoor");
    assert_eq!(QueueName::from_key("general"), QueueName::General);
}

#[test]
fn test_task_ids_are_unique() {
    assert_ne!(new_task_id(), new_task_id());
}

#[test]
fn test_clock_helpers() {
    assert!(now_ms() > 0);
    assert_eq!(after(1_000, Duration::from_millis(500)), 1_500);
    assert_eq!(secs_until(2_001, 1_000), 2);
    assert_eq!(secs_until(1_000, 2_000), 0);
}
