//! # Apply Dispatch
//!
//! Task scheduling core for job-application automation.
//!
//! Search and apply tasks are submitted per platform, ordered by priority,
//! and executed by a bounded worker pool through a caller-supplied
//! [`core::PlatformAdapter`]. Every submission passes admission control
//! first, so a task is either queued or refused on the spot:
//!
//! - **Circuit breaker**: per-platform CLOSED / OPEN / HALF_OPEN state
//!   machine. An open circuit refuses new work; a half-open circuit lets a
//!   single probe through. The reset deadline is persisted, not a timer.
//! - **Rate limiter**: fixed-window quota per platform and user, scaled by
//!   subscription tier.
//!
//! Failed attempts are retried with capped exponential backoff. Metrics
//! snapshots (counts, throughput, error rate, latency) are sampled on an
//! interval and threshold alerts raised from them.
//!
//! ## Getting started
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use apply_dispatch::builders::SchedulerBuilder;
//! use apply_dispatch::config::SchedulerConfig;
//! use apply_dispatch::core::{EnqueueOptions, SearchPayload, TaskPayload};
//!
//! let scheduler = SchedulerBuilder::new(SchedulerConfig::from_env()?)
//!     .adapter(Arc::new(MyAdapter))
//!     .tier_lookup(Arc::new(MyTiers))
//!     .build()?;
//! scheduler.start();
//!
//! let id = scheduler
//!     .submit(
//!         "linkedin",
//!         TaskPayload::Search(SearchPayload::default()),
//!         EnqueueOptions::for_user("user-1"),
//!     )
//!     .await?;
//! ```
//!
//! Admission refusals come back as
//! [`core::SchedulerError::AdmissionDenied`] and carry the reason; a task
//! that ran out of attempts is reported as [`core::TaskStatus::Failed`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling: admission control, queueing, dispatch, and health tracking.
pub mod core;
/// Configuration models for queues, admission control, retries, and monitoring.
pub mod config;
/// Builders to construct the scheduler from configuration.
pub mod builders;
/// Infrastructure adapters for state storage backends.
pub mod infra;
/// Runtime adapters and the scheduler facade.
pub mod runtime;
/// Shared utilities.
pub mod util;
