//! Collaborator traits: platform execution, tier lookup, and task spawning.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;

use crate::core::error::{AdapterError, SchedulerError};
use crate::core::task::{Task, TaskOutput};
use crate::util::serde::SubscriptionTier;

/// Runs one attempt of a task against its platform.
///
/// Implementations carry the platform-specific automation (login, search,
/// form filling). The worker pool wraps every call in the queue's timeout.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use apply_dispatch::core::{AdapterError, PlatformAdapter, Task, TaskOutput};
///
/// struct EchoAdapter;
///
/// #[async_trait]
/// impl PlatformAdapter for EchoAdapter {
///     async fn execute(&self, task: &Task) -> Result<TaskOutput, AdapterError> {
///         Ok(serde_json::json!({ "platform": task.platform }))
///     }
/// }
/// ```
#[async_trait]
pub trait PlatformAdapter: Send + Sync + 'static {
    /// Execute one attempt of `task`.
    async fn execute(&self, task: &Task) -> Result<TaskOutput, AdapterError>;
}

/// Resolves a user's subscription tier.
#[async_trait]
pub trait UserTierLookup: Send + Sync + 'static {
    /// Tier of `user_id`.
    async fn tier(&self, user_id: &str) -> Result<SubscriptionTier, SchedulerError>;
}

/// Tier lookup backed by a fixed map.
#[derive(Debug, Clone, Default)]
pub struct StaticTierLookup {
    default: SubscriptionTier,
    tiers: HashMap<String, SubscriptionTier>,
}

impl StaticTierLookup {
    /// Every user gets `default` unless set with [`Self::with_user`].
    #[must_use]
    pub fn new(default: SubscriptionTier) -> Self {
        Self {
            default,
            tiers: HashMap::new(),
        }
    }

    /// Assign a tier to one user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>, tier: SubscriptionTier) -> Self {
        self.tiers.insert(user_id.into(), tier);
        self
    }
}

#[async_trait]
impl UserTierLookup for StaticTierLookup {
    async fn tier(&self, user_id: &str) -> Result<SubscriptionTier, SchedulerError> {
        Ok(self.tiers.get(user_id).copied().unwrap_or(self.default))
    }
}

/// Abstraction for spawning background work on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
