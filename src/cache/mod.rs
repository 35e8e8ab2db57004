//! Time-windowed in-memory cache for fetched datasets and quotes.
//!
//! Entries are whole `Arc` snapshots swapped under a lock. Two concurrent
//! misses for the same key may both fetch; the last write wins.

use crate::models::{Dataset, Quote};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Source of "now"; swapped for a fixed clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Values that carry the time they were fetched.
pub trait Timestamped {
    fn fetched_at(&self) -> DateTime<Utc>;
}

impl<T> Timestamped for Dataset<T> {
    fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

impl Timestamped for Quote {
    fn fetched_at(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

pub struct TimedCache<K, V> {
    clock: Arc<dyn Clock>,
    window: TimeDelta,
    entries: RwLock<HashMap<K, Arc<V>>>,
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Timestamped,
{
    pub fn new(clock: Arc<dyn Clock>, window: TimeDelta) -> Self {
        Self {
            clock,
            window,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Stored value for `key` if it is still inside the window.
    pub async fn get_fresh(&self, key: &K) -> Option<Arc<V>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|v| now.signed_duration_since(v.fetched_at()) < self.window)
            .cloned()
    }

    /// Returns the fresh entry or runs `fetch(now)` and stores its result.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Arc<V>
    where
        F: FnOnce(DateTime<Utc>) -> Fut,
        Fut: Future<Output = V>,
    {
        let result = self
            .get_or_try_fetch(key, |now| async move { Ok::<V, Infallible>(fetch(now).await) })
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch) but an `Err` is returned
    /// without touching the stored entry.
    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce(DateTime<Utc>) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get_fresh(&key).await {
            debug!("cache hit {:?}", key);
            return Ok(hit);
        }

        debug!("cache miss {:?}", key);
        let value = Arc::new(fetch(self.clock.now()).await?);
        self.entries.write().await.insert(key, Arc::clone(&value));
        Ok(value)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
