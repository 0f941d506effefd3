use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::gate::{CancelError, LimitError, Limiter, DEFAULT_LIMITER_NAME};

/// One independent [`Limiter`] per key
///
/// Every key gets its own slots; callers on different keys never wait on
/// each other. Limiters are created on first use.
pub struct KeyedLimiter<K> {
    name: String,
    capacity: usize,
    limits: DashMap<K, Arc<Limiter>>,
}

impl<K> KeyedLimiter<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Result<Self, LimitError> {
        Self::named(DEFAULT_LIMITER_NAME, capacity)
    }

    /// Create a keyed limiter; `name` labels every per-key limiter
    pub fn named(name: impl Into<String>, capacity: usize) -> Result<Self, LimitError> {
        let name = name.into();
        // Validate up front so creating a key's limiter later cannot fail.
        Limiter::named(name.clone(), capacity)?;

        Ok(Self {
            name,
            capacity,
            limits: DashMap::new(),
        })
    }

    /// Slots per key
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get or create the limiter for `key`
    pub fn limiter(&self, key: K) -> Arc<Limiter> {
        self.limits
            .entry(key)
            .or_insert_with(|| {
                debug!(limiter = %self.name, "Creating keyed limiter");
                Arc::new(Limiter::with_valid_capacity(self.name.clone(), self.capacity))
            })
            .clone()
    }

    /// Get the limiter for `key` if one exists
    pub fn get(&self, key: &K) -> Option<Arc<Limiter>> {
        self.limits.get(key).map(|r| r.value().clone())
    }

    /// Run `task` under the limiter for `key`
    pub async fn run<F, Fut, T, E>(
        &self,
        key: K,
        cancel: &CancellationToken,
        task: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CancelError>,
    {
        let limiter = self.limiter(key);
        limiter.run(cancel, task).await
    }

    /// Run `task` under the limiter for `key`, giving up after `timeout`
    pub async fn run_with_timeout<F, Fut, T, E>(
        &self,
        key: K,
        timeout: Duration,
        task: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CancelError>,
    {
        let limiter = self.limiter(key);
        limiter.run_with_timeout(timeout, task).await
    }

    /// Number of keys with a live limiter
    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Drop limiters with no slot checked out and no outside reference
    ///
    /// Returns the number of keys removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.limits.len();
        self.limits.retain(|_, limiter| {
            Arc::strong_count(limiter) > 1 || limiter.in_flight() > 0
        });
        let removed = before.saturating_sub(self.limits.len());
        if removed > 0 {
            debug!(limiter = %self.name, removed, "Pruned idle keyed limiters");
        }
        removed
    }
}
