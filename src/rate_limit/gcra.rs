use crate::clock::{Clock, SystemClock};
use crate::error::LimiterError;
use crate::rate_limit::store::CounterStore;
use crate::rate_limit::{Decision, DenyReason, FailurePolicy, RateLimiter};
use crate::telemetry::{EventSink, NullSink, SecurityEvent};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on compare-and-swap attempts per check.
pub const DEFAULT_MAX_CAS_ATTEMPTS: usize = 10;

/// A steady-state rate: `count` events per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    count: u32,
    period: Duration,
}

impl Rate {
    /// `count` events every `period`.
    pub const fn new(count: u32, period: Duration) -> Self {
        Self { count, period }
    }

    /// `count` events per second.
    pub const fn per_second(count: u32) -> Self {
        Self::new(count, Duration::from_secs(1))
    }

    /// `count` events per minute.
    pub const fn per_minute(count: u32) -> Self {
        Self::new(count, Duration::from_secs(60))
    }

    /// `count` events per hour.
    pub const fn per_hour(count: u32) -> Self {
        Self::new(count, Duration::from_secs(60 * 60))
    }

    /// `count` events per day.
    pub const fn per_day(count: u32) -> Self {
        Self::new(count, Duration::from_secs(24 * 60 * 60))
    }

    /// Events per period.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Period length.
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Rate plus extra burst.
///
/// An idle key admits `max_rate.count() + max_burst` events back to back, then
/// one event per emission interval (`period / count`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Sustained rate.
    pub max_rate: Rate,
    /// Extra events tolerated on top of one period's worth.
    pub max_burst: u32,
}

impl Quota {
    /// Build a quota.
    pub const fn new(max_rate: Rate, max_burst: u32) -> Self {
        Self {
            max_rate,
            max_burst,
        }
    }

    /// Time between two conforming events.
    pub fn emission_interval(&self) -> Duration {
        match self.max_rate.count {
            0 => Duration::ZERO,
            n => self.max_rate.period / n,
        }
    }

    /// Events admitted instantaneously from an idle key.
    pub fn capacity(&self) -> u64 {
        u64::from(self.max_rate.count) + u64::from(self.max_burst)
    }

    fn validate(&self) -> Result<(), LimiterError> {
        if self.max_rate.count == 0 {
            return Err(LimiterError::InvalidQuota("rate count must be positive".into()));
        }
        if self.emission_interval().is_zero() {
            return Err(LimiterError::InvalidQuota(format!(
                "period {:?} too short for {} events",
                self.max_rate.period, self.max_rate.count
            )));
        }
        if i64::try_from(self.emission_interval().as_nanos()).is_err() {
            return Err(LimiterError::InvalidQuota("emission interval overflows".into()));
        }
        Ok(())
    }
}

fn nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

fn duration(nanos: i64) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
}

/// Generic Cell Rate Algorithm limiter over a [`CounterStore`].
///
/// Each key stores its theoretical arrival time (TAT) in nanoseconds. An event at `now`
/// is admitted iff `now >= max(TAT, now) + interval - tolerance`; on admission the TAT
/// advances by one interval. Writes go through compare-and-swap, so concurrent checks on
/// the same key never both win the same slot. Keys never share a lock.
pub struct GcraLimiter<S> {
    store: Arc<S>,
    quota: ArcSwap<Quota>,
    clock: Arc<dyn Clock>,
    failure_policy: FailurePolicy,
    max_cas_attempts: usize,
    sink: Arc<dyn EventSink>,
}

impl<S> std::fmt::Debug for GcraLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcraLimiter")
            .field("quota", &**self.quota.load())
            .field("failure_policy", &self.failure_policy)
            .field("max_cas_attempts", &self.max_cas_attempts)
            .finish_non_exhaustive()
    }
}

impl<S> GcraLimiter<S>
where
    S: CounterStore + 'static,
{
    /// Create a limiter backed by `store`. Fails if the quota has no positive interval.
    pub fn new(store: S, quota: Quota) -> Result<Self, LimiterError> {
        quota.validate()?;
        Ok(Self {
            store: Arc::new(store),
            quota: ArcSwap::from_pointee(quota),
            clock: Arc::new(SystemClock),
            failure_policy: FailurePolicy::default(),
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            sink: Arc::new(NullSink),
        })
    }

    /// Use `clock` as the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Choose what happens when the store fails.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Bound the CAS retry loop (minimum 1).
    pub fn with_max_cas_attempts(mut self, attempts: usize) -> Self {
        self.max_cas_attempts = attempts.max(1);
        self
    }

    /// Emit events into `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Current quota.
    pub fn quota(&self) -> Quota {
        **self.quota.load()
    }

    /// Replace the quota at runtime. Existing TATs are kept.
    pub fn set_quota(&self, quota: Quota) -> Result<(), LimiterError> {
        quota.validate()?;
        self.quota.store(Arc::new(quota));
        Ok(())
    }

    /// Decide whether `quantity` events for `key` are admitted.
    pub async fn check_n(&self, key: &str, quantity: u32) -> Decision {
        let quota = self.quota();
        let limit = quota.capacity();
        let interval = nanos(quota.emission_interval());
        let increment = interval.saturating_mul(i64::from(quantity));
        let tolerance = interval.saturating_mul(i64::try_from(limit).unwrap_or(i64::MAX));

        for _ in 0..self.max_cas_attempts {
            let now = self.clock.now_nanos();
            let stored = match self.store.get(key).await {
                Ok(v) => v,
                Err(e) => return self.on_store_failure(key, limit, &e.to_string()),
            };
            let tat = stored.unwrap_or(now).max(now);
            let new_tat = tat.saturating_add(increment);
            let allow_at = new_tat.saturating_sub(tolerance);

            if now < allow_at {
                let retry_after = duration(allow_at - now);
                tracing::info!(key, ?retry_after, "rate limit exceeded");
                self.sink.record(SecurityEvent::RateLimitDenied {
                    key: key.to_string(),
                    retry_after,
                });
                return Decision::Denied {
                    limit,
                    retry_after,
                    reset_after: duration(tat - now),
                    reason: DenyReason::Exhausted,
                };
            }

            let ttl = duration(new_tat - now);
            let written = match stored {
                None => self.store.set_if_absent(key, new_tat, ttl).await,
                Some(old) => self.store.compare_and_swap(key, old, new_tat, ttl).await,
            };
            match written {
                Ok(true) => {
                    let headroom = tolerance - (new_tat - now);
                    let remaining = if headroom > 0 { (headroom / interval) as u64 } else { 0 };
                    self.sink.record(SecurityEvent::RateLimitAllowed {
                        key: key.to_string(),
                        remaining,
                    });
                    return Decision::Allowed {
                        limit,
                        remaining,
                        reset_after: ttl,
                    };
                }
                Ok(false) => tracing::trace!(key, "counter changed underneath us; retrying"),
                Err(e) => return self.on_store_failure(key, limit, &e.to_string()),
            }
        }

        tracing::warn!(key, attempts = self.max_cas_attempts, "rate limit CAS contention");
        let retry_after = duration(interval);
        self.sink.record(SecurityEvent::RateLimitDenied {
            key: key.to_string(),
            retry_after,
        });
        Decision::Denied {
            limit,
            retry_after,
            reset_after: retry_after,
            reason: DenyReason::Contention,
        }
    }

    fn on_store_failure(&self, key: &str, limit: u64, cause: &str) -> Decision {
        let admitted = self.failure_policy == FailurePolicy::Open;
        tracing::warn!(key, cause, admitted, "rate limit store unavailable");
        self.sink.record(SecurityEvent::RateLimitStoreFailure {
            key: key.to_string(),
            admitted,
        });
        if admitted {
            Decision::Allowed {
                limit,
                remaining: 0,
                reset_after: Duration::ZERO,
            }
        } else {
            let retry_after = self.quota().emission_interval();
            Decision::Denied {
                limit,
                retry_after,
                reset_after: retry_after,
                reason: DenyReason::StoreUnavailable,
            }
        }
    }
}

#[async_trait]
impl<S> RateLimiter for GcraLimiter<S>
where
    S: CounterStore + 'static,
{
    async fn check(&self, key: &str) -> Result<Decision, LimiterError> {
        Ok(self.check_n(key, 1).await)
    }
}
