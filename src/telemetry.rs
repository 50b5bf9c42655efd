//! Telemetry for the gate and the limiter.
//!
//! Components emit [`SecurityEvent`]s into an [`EventSink`]. Sinks can log,
//! aggregate, or forward events to external systems. Emission never blocks
//! or fails the request path.
//!
//! ```rust
//! use sessiongate::telemetry::{EventSink, MemorySink, SecurityEvent};
//!
//! let sink = MemorySink::new();
//! sink.record(SecurityEvent::RateLimitAllowed { key: "/login".into(), remaining: 4 });
//! assert_eq!(sink.len(), 1);
//! ```

use crate::error::Rejection;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Events emitted by the limiter, the gate and the session flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    /// A request was admitted by the limiter.
    RateLimitAllowed {
        /// Limiter key.
        key: String,
        /// Requests left before the burst allowance is exhausted.
        remaining: u64,
    },
    /// A request was denied by the limiter.
    RateLimitDenied {
        /// Limiter key.
        key: String,
        /// How long the caller should wait.
        retry_after: Duration,
    },
    /// The counter store failed; `admitted` records the failure policy outcome.
    RateLimitStoreFailure {
        /// Limiter key.
        key: String,
        /// Whether the request was let through anyway.
        admitted: bool,
    },
    /// A request authenticated.
    AuthSucceeded {
        /// Authenticated user.
        user_id: String,
    },
    /// A request was rejected by the gate.
    AuthRejected {
        /// Internal rejection class.
        reason: Rejection,
    },
    /// A session was created at login.
    SessionCreated {
        /// Owner of the new session.
        user_id: String,
    },
    /// Sessions were soft-deleted.
    SessionsInvalidated {
        /// Number of sessions affected.
        count: usize,
    },
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimitAllowed { key, remaining } => {
                write!(f, "RateLimit::Allowed(key={}, remaining={})", key, remaining)
            }
            Self::RateLimitDenied { key, retry_after } => {
                write!(f, "RateLimit::Denied(key={}, retry_after={:?})", key, retry_after)
            }
            Self::RateLimitStoreFailure { key, admitted } => {
                write!(f, "RateLimit::StoreFailure(key={}, admitted={})", key, admitted)
            }
            Self::AuthSucceeded { user_id } => write!(f, "Auth::Succeeded(user={})", user_id),
            Self::AuthRejected { reason } => write!(f, "Auth::Rejected({})", reason.as_str()),
            Self::SessionCreated { user_id } => write!(f, "Session::Created(user={})", user_id),
            Self::SessionsInvalidated { count } => write!(f, "Session::Invalidated({})", count),
        }
    }
}

/// Consumer of [`SecurityEvent`]s.
///
/// Implementations must be cheap and must not panic; they run on the request path.
pub trait EventSink: Send + Sync + fmt::Debug {
    /// Record one event. Best effort.
    fn record(&self, event: SecurityEvent);
}

/// Sink that discards every event.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: SecurityEvent) {}
}

/// Sink that logs events using the `tracing` crate at INFO level.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: SecurityEvent) {
        tracing::info!(event = %event, "security_event");
    }
}

/// Bounded in-memory sink. Useful for tests and debugging.
///
/// Oldest events are evicted when capacity is exceeded; [`MemorySink::evicted`]
/// counts how many were dropped.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<SecurityEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Creates a bounded memory sink (default cap: 10,000).
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Creates a bounded memory sink with explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of recorded events, oldest first.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).iter().cloned().collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True when no events are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events dropped due to capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Drop all retained events.
    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: SecurityEvent) {
        let mut guard = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() == self.capacity {
            guard.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(event);
    }
}
