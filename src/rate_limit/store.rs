use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Abstract storage interface for rate limit counters.
///
/// This trait is designed to support both in-memory and distributed backends
/// (e.g., Redis with `SET NX PX` and a CAS script). Values are opaque `i64`s;
/// the GCRA limiter stores its theoretical arrival time in nanoseconds.
///
/// Every write carries a TTL. Entries whose TTL has elapsed must read as absent.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Fetch the live value for `key`. `None` means "no history", not an error.
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Insert `value` only if no live entry exists.
    ///
    /// Returns `Ok(false)` if another writer got there first.
    async fn set_if_absent(&self, key: &str, value: i64, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Replace the live value with `new` only if it still equals `old`.
    ///
    /// Returns `Ok(false)` if the value changed or the entry is gone (retry needed).
    async fn compare_and_swap(
        &self,
        key: &str,
        old: i64,
        new: i64,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        (**self).get(key).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        old: i64,
        new: i64,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap(key, old, new, ttl).await
    }
}

#[derive(Clone, Copy, Debug)]
struct Counter {
    value: i64,
    expires_at: i64,
}

impl Counter {
    fn is_live(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

fn deadline(now: i64, ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
    now.saturating_add(ttl)
}

/// In-memory counter store with enforced expiry.
///
/// Backed by a sharded map, so unrelated keys never contend on one lock. Expired
/// entries are dropped lazily when touched and in bulk by [`purge_expired`]
/// or a background [`spawn_sweeper`] task.
///
/// [`purge_expired`]: InMemoryCounterStore::purge_expired
/// [`spawn_sweeper`]: InMemoryCounterStore::spawn_sweeper
#[derive(Clone, Debug)]
pub struct InMemoryCounterStore {
    data: Arc<DashMap<String, Counter>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounterStore {
    /// Store driven by the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store driven by `clock`; entries expire against this clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of entries held, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_nanos();
        let before = self.data.len();
        self.data.retain(|_, c| c.is_live(now));
        let purged = before.saturating_sub(self.data.len());
        if purged > 0 {
            tracing::debug!(purged, "counter store sweep");
        }
        purged
    }

    /// Run [`purge_expired`](Self::purge_expired) every `period` on the current tokio runtime.
    ///
    /// The task stops when the returned handle is dropped.
    pub fn spawn_sweeper(&self, period: Duration) -> SweeperHandle {
        let store = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.purge_expired();
            }
        });
        SweeperHandle { task }
    }
}

/// Handle to a background sweep task; aborts the task on drop.
#[derive(Debug)]
pub struct SweeperHandle {
    task: tokio::task::JoinHandle<()>,
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = self.clock.now_nanos();
        let expired = match self.data.get(key) {
            Some(c) if c.is_live(now) => return Ok(Some(c.value)),
            Some(_) => true,
            None => false,
        };
        // The read guard is released before eviction takes the shard write lock.
        if expired {
            self.data.remove_if(key, |_, c| !c.is_live(now));
        }
        Ok(None)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_nanos();
        let fresh = Counter {
            value,
            expires_at: deadline(now, ttl),
        };
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_live(now) {
                    return Ok(false);
                }
                slot.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        old: i64,
        new: i64,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_nanos();
        match self.data.get_mut(key) {
            Some(mut slot) if slot.is_live(now) && slot.value == old => {
                *slot = Counter {
                    value: new,
                    expires_at: deadline(now, ttl),
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
