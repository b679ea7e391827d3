//! Serializable identifier and classification types shared across the crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique task identifier.
pub type TaskId = uuid::Uuid;

/// Generate a fresh task identifier.
#[must_use]
pub fn new_task_id() -> TaskId {
    uuid::Uuid::new_v4()
}

/// Scheduling priority. Lower values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u32);

impl Priority {
    /// Most urgent priority value.
    pub const URGENT: Self = Self(0);

    /// Raw numeric value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for Priority {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription level of a user, lowest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    /// Free plan.
    #[default]
    Free,
    /// Paid plan.
    Pro,
    /// Highest plan.
    Premium,
}

impl SubscriptionTier {
    /// Default queue priority for work submitted by this tier.
    #[must_use]
    pub const fn default_priority(self) -> Priority {
        match self {
            Self::Free => Priority(10),
            Self::Pro => Priority(5),
            Self::Premium => Priority(1),
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a queue partition: one per platform plus a platform-agnostic queue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Queue dedicated to one platform.
    Platform(String),
    /// Platform-agnostic queue.
    General,
}

impl QueueName {
    /// Key used for per-queue configuration and metrics storage.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Platform(name) => name,
            Self::General => "general",
        }
    }

    /// Parse a configuration/metrics key back into a queue name.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        if key == "general" {
            Self::General
        } else {
            Self::Platform(key.to_string())
        }
    }

    /// Platform queue shorthand.
    pub fn platform(name: impl Into<String>) -> Self {
        Self::Platform(name.into())
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
