//! Rate limiting primitives.
//!
//! This module provides the building blocks for request admission:
//! - [`RateLimiter`]: The core trait for rate limiting logic.
//! - [`RateLimitLayer`]: Tower middleware that enforces the limit on `http` requests.
//! - [`Decision`]: The result of a rate limit check (Allowed/Denied).
//!
//! # Architecture
//!
//! The system is designed to be modular:
//! - **Middleware**: `RateLimitLayer` wraps your service. It doesn't know *how* limiting works,
//!   only that it should ask a `RateLimiter` about the key derived by [`VaryBy`].
//! - **Logic**: [`GcraLimiter`] (in the `gcra` module) handles the math.
//! - **Storage**: [`CounterStore`](store::CounterStore) (in the `store` module) handles the
//!   state, enabling in-memory or distributed backends (e.g., Redis).

use crate::error::LimiterError;
use std::time::Duration;

pub mod gcra;
pub mod key;
pub mod middleware;
pub mod store;

pub use gcra::{GcraLimiter, Quota, Rate};
pub use key::VaryBy;
pub use middleware::{RateLimitLayer, RateLimitService};
pub use store::{CounterStore, InMemoryCounterStore};

/// What the limiter does when its counter store fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Deny the request.
    #[default]
    Closed,
    /// Admit the request without touching any counter.
    Open,
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The key used up its burst allowance.
    Exhausted,
    /// Compare-and-swap kept losing to concurrent writers.
    Contention,
    /// The counter store failed under [`FailurePolicy::Closed`].
    StoreUnavailable,
}

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed {
        /// Events admitted instantaneously from an idle key.
        /// Useful for `X-RateLimit-Limit` headers.
        limit: u64,
        /// Events still admissible right now.
        /// Useful for `X-RateLimit-Remaining` headers.
        remaining: u64,
        /// Time until the key is fully idle again.
        reset_after: Duration,
    },
    /// The request is denied.
    Denied {
        /// Events admitted instantaneously from an idle key.
        limit: u64,
        /// How long the caller should wait before retrying.
        /// Useful for `Retry-After` headers.
        retry_after: Duration,
        /// Time until the key is fully idle again.
        reset_after: Duration,
        /// Reason for denial.
        reason: DenyReason,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Wait hint; zero when allowed.
    pub fn retry_after(&self) -> Duration {
        match self {
            Decision::Allowed { .. } => Duration::ZERO,
            Decision::Denied { retry_after, .. } => *retry_after,
        }
    }

    /// Remaining allowance; zero when denied.
    pub fn remaining(&self) -> u64 {
        match self {
            Decision::Allowed { remaining, .. } => *remaining,
            Decision::Denied { .. } => 0,
        }
    }

    /// Denial reason, if denied.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { reason, .. } => Some(*reason),
        }
    }
}

/// Core interface for rate limiting logic.
///
/// This trait allows decoupling the middleware from the algorithm and the storage.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide whether one event for `key` is admitted.
    async fn check(&self, key: &str) -> Result<Decision, LimiterError>;
}

#[async_trait::async_trait]
impl<L: RateLimiter + ?Sized> RateLimiter for std::sync::Arc<L> {
    async fn check(&self, key: &str) -> Result<Decision, LimiterError> {
        (**self).check(key).await
    }
}
