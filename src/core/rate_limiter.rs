//! Per-(platform, user) fixed-window admission quotas scaled by tier.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::core::store::RateLimitStore;
use crate::util::clock::{after, secs_until};
use crate::util::serde::SubscriptionTier;

/// Counter for one platform/user window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    /// Admissions counted in this window.
    pub points_consumed: u32,
    /// Window end (ms since epoch); the window is discarded afterwards.
    pub window_expires_at_ms: u128,
    /// Quota for the window.
    pub max_points: u32,
}

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Whether a further admission would be (or was) allowed.
    pub allowed: bool,
    /// Points consumed in the current window.
    pub points: u32,
    /// Quota for the user's tier.
    pub max_points: u32,
    /// Points left in the window.
    pub remaining: u32,
    /// Seconds until the window resets; zero with no live window.
    pub reset_in_secs: u64,
}

/// Tier-scaled fixed-window rate limiter.
///
/// Storage failures admit the request: availability is preferred over strict
/// quota enforcement.
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    /// Create a limiter over `store`.
    pub fn new(config: RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self { config, store }
    }

    /// Store key for a platform/user pair.
    #[must_use]
    pub fn window_key(platform: &str, user_id: &str) -> String {
        format!("ratelimit:{platform}:{user_id}")
    }

    /// Quota for a platform and tier.
    #[must_use]
    pub fn max_points(&self, platform: &str, tier: SubscriptionTier) -> u32 {
        self.config.max_points(platform, tier)
    }

    /// Count one admission if the window has room.
    pub fn consume(
        &self,
        platform: &str,
        user_id: &str,
        tier: SubscriptionTier,
        now_ms: u128,
    ) -> RateLimitStatus {
        let max_points = self.max_points(platform, tier);
        let fresh = RateLimitWindow {
            points_consumed: 0,
            window_expires_at_ms: after(now_ms, self.config.window()),
            max_points,
        };
        let mut allowed = false;
        let result = self.store.modify(
            &Self::window_key(platform, user_id),
            now_ms,
            fresh,
            &mut |window| {
                // Tier changes take effect within the current window.
                window.max_points = max_points;
                allowed = window.points_consumed < max_points;
                if allowed {
                    window.points_consumed += 1;
                }
            },
        );
        match result {
            Ok(window) => {
                let status = status_of(&window, allowed, now_ms);
                if allowed {
                    debug!(platform, user_id, points = status.points, max_points, "admission counted");
                } else {
                    warn!(platform, user_id, max_points, reset_in_secs = status.reset_in_secs, "rate limit reached");
                }
                status
            }
            Err(e) => {
                warn!(platform, user_id, error = %e, "rate limit store unavailable, admitting");
                RateLimitStatus {
                    allowed: true,
                    points: 0,
                    max_points,
                    remaining: max_points,
                    reset_in_secs: 0,
                }
            }
        }
    }

    /// Read the current window without consuming.
    pub fn status(
        &self,
        platform: &str,
        user_id: &str,
        tier: SubscriptionTier,
        now_ms: u128,
    ) -> RateLimitStatus {
        let max_points = self.max_points(platform, tier);
        match self.store.peek(&Self::window_key(platform, user_id), now_ms) {
            Ok(Some(mut window)) => {
                window.max_points = max_points;
                let allowed = window.points_consumed < max_points;
                status_of(&window, allowed, now_ms)
            }
            Ok(None) => RateLimitStatus {
                allowed: true,
                points: 0,
                max_points,
                remaining: max_points,
                reset_in_secs: 0,
            },
            Err(e) => {
                warn!(platform, user_id, error = %e, "rate limit store unavailable");
                RateLimitStatus {
                    allowed: true,
                    points: 0,
                    max_points,
                    remaining: max_points,
                    reset_in_secs: 0,
                }
            }
        }
    }

    /// Drop the current window. Returns whether one existed.
    pub fn reset(&self, platform: &str, user_id: &str) -> bool {
        match self.store.clear(&Self::window_key(platform, user_id)) {
            Ok(existed) => existed,
            Err(e) => {
                warn!(platform, user_id, error = %e, "rate limit reset failed");
                false
            }
        }
    }
}

impl RateLimiter {
    /// Drop expired windows from the store. Returns how many were dropped.
    pub fn purge_expired(&self, now_ms: u128) -> usize {
        match self.store.purge_expired(now_ms) {
            Ok(purged) => {
                if purged > 0 {
                    debug!(purged, "expired rate limit windows dropped");
                }
                purged
            }
            Err(e) => {
                warn!(error = %e, "rate limit purge failed");
                0
            }
        }
    }
}

fn status_of(window: &RateLimitWindow, allowed: bool, now_ms: u128) -> RateLimitStatus {
    RateLimitStatus {
        allowed,
        points: window.points_consumed,
        max_points: window.max_points,
        remaining: window.max_points.saturating_sub(window.points_consumed),
        reset_in_secs: secs_until(window.window_expires_at_ms, now_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::store::InMemoryStateStore;

    fn limiter() -> RateLimiter {
        let config = RateLimitConfig {
            window_secs: 60,
            default_points: 100,
            ..RateLimitConfig::default()
        };
        RateLimiter::new(config, Arc::new(InMemoryStateStore::new()))
    }

    #[test]
    fn tier_scales_quota() {
        let rl = limiter();
        assert_eq!(rl.max_points("linkedin", SubscriptionTier::Free), 100);
        assert_eq!(rl.max_points("linkedin", SubscriptionTier::Pro), 200);
        assert_eq!(rl.max_points("linkedin", SubscriptionTier::Premium), 300);
    }

    #[test]
    fn denies_past_quota_then_resets_after_window() {
        let rl = limiter();
        let start = 1_000_000;
        for i in 0..200 {
            let s = rl.consume("linkedin", "u1", SubscriptionTier::Pro, start + i);
            assert!(s.allowed, "call {i} should be admitted");
        }
        let denied = rl.consume("linkedin", "u1", SubscriptionTier::Pro, start + 500);
        assert!(!denied.allowed);
        assert_eq!(denied.points, 200);
        assert_eq!(denied.remaining, 0);

        let later = start + 60_000;
        let status = rl.status("linkedin", "u1", SubscriptionTier::Pro, later);
        assert_eq!(status.points, 0);
        assert!(rl.consume("linkedin", "u1", SubscriptionTier::Pro, later).allowed);
        assert_eq!(rl.status("linkedin", "u1", SubscriptionTier::Pro, later).points, 1);
    }

    #[test]
    fn status_does_not_consume() {
        let rl = limiter();
        rl.consume("indeed", "u1", SubscriptionTier::Free, 0);
        let a = rl.status("indeed", "u1", SubscriptionTier::Free, 10);
        let b = rl.status("indeed", "u1", SubscriptionTier::Free, 20);
        assert_eq!(a.points, 1);
        assert_eq!(b.points, 1);
        assert_eq!(b.remaining, 99);
        assert_eq!(b.reset_in_secs, 60);
    }

    #[test]
    fn users_and_platforms_are_isolated() {
        let rl = limiter();
        rl.consume("indeed", "u1", SubscriptionTier::Free, 0);
        assert_eq!(rl.status("indeed", "u2", SubscriptionTier::Free, 0).points, 0);
        assert_eq!(rl.status("linkedin", "u1", SubscriptionTier::Free, 0).points, 0);
    }

    #[test]
    fn reset_clears_window() {
        let rl = limiter();
        rl.consume("indeed", "u1", SubscriptionTier::Free, 0);
        assert!(rl.reset("indeed", "u1"));
        assert!(!rl.reset("indeed", "u1"));
        assert_eq!(rl.status("indeed", "u1", SubscriptionTier::Free, 1).points, 0);
    }
}
