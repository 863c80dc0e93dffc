use std::sync::Arc;

use tokio::time::Instant;

use super::{CacheEntry, CacheError, EntryStore, InFlight, Role, StoredValue};
use crate::backend::Backend;
use crate::config::{CacheConfig, CoalescingMode};

/// Looks up values in the [`EntryStore`], computing them via a [`Backend`] when needed.
///
/// Concurrent misses for the same key are deduplicated using the [`InFlight`] registry, unless
/// the cacher runs in [`CoalescingMode::Naive`].
#[derive(Clone)]
pub struct Cacher {
    config: CacheConfig,

    /// The last computed value of every key.
    store: EntryStore,

    /// Used for deduplicating concurrent computations.
    in_flight: InFlight,

    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for Cacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cacher")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl Cacher {
    pub fn new(config: CacheConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            config,
            store: EntryStore::new(),
            in_flight: InFlight::new(),
            backend,
        }
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// The number of computations currently in flight.
    pub fn running_computations(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns the value for `key`, computing it if there is no fresh value cached.
    ///
    /// In [`CoalescingMode::Coalesced`], at most one computation per key runs at any time. All
    /// callers arriving while it runs get the very same outcome, including errors. Errors are
    /// never cached and never retried here, the next lookup after a failure simply starts a new
    /// computation.
    pub async fn lookup(&self, key: &str) -> CacheEntry {
        metric!(counter("caches.access") += 1);

        match self.store.get(key) {
            Some(stored) if stored.is_fresh() => {
                metric!(counter("caches.memory.hit") += 1);
                tracing::trace!(key, "Cache hit");
                return Ok(stored.value);
            }
            Some(_) => tracing::debug!(key, "Cached value is stale"),
            None => tracing::debug!(key, "Cache miss"),
        }

        match self.config.mode {
            CoalescingMode::Coalesced => self.compute_coalesced(key).await,
            CoalescingMode::Naive => self.compute(key).await,
        }
    }

    pub(super) async fn compute_coalesced(&self, key: &str) -> CacheEntry {
        let leader = match self.in_flight.join_or_lead(key) {
            Role::Follower(follower) => {
                // A concurrent lookup was deduplicated.
                metric!(counter("caches.channel.hit") += 1);
                tracing::debug!(key, "Waiting for running computation");
                return follower.wait().await;
            }
            Role::Leader(leader) => leader,
        };
        metric!(counter("caches.channel.miss") += 1);

        // Another computation might have finished in between looking into the store and
        // registering ourselves as leader.
        if let Some(stored) = self.store.get(key).filter(StoredValue::is_fresh) {
            tracing::debug!(key = leader.key(), "Value was stored while becoming leader");
            leader.resolve(stored.value.clone());
            return Ok(stored.value);
        }

        // If this future is dropped while computing, dropping the `leader` settles the
        // computation as cancelled.
        let entry = self.compute(key).await;
        match &entry {
            Ok(value) => leader.resolve(value.clone()),
            Err(err) => leader.fail(err.clone()),
        }
        entry
    }

    /// Computes the value for `key` and puts it into the store on success.
    ///
    /// This does not take care of deduplicating concurrent computations, see
    /// [`Cacher::lookup`] for that.
    async fn compute(&self, key: &str) -> CacheEntry {
        let start = Instant::now();
        let computation = self.backend.compute(key);
        let entry = match self.config.computation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, computation)
                .await
                .unwrap_or(Err(CacheError::Timeout(timeout))),
            None => computation.await,
        };

        let status = match &entry {
            Ok(_) => "ok",
            Err(err) => err.metrics_tag(),
        };
        metric!(counter("caches.computation") += 1, "status" => status);
        metric!(timer("caches.computation.duration") = start.elapsed(), "status" => status);

        match &entry {
            Ok(value) => {
                self.store.put(key, value.clone(), self.config.ttl);
                tracing::debug!(key, ttl = ?self.config.ttl, "Stored computed value");
            }
            Err(err) => {
                tracing::warn!(key, error = err as &dyn std::error::Error, "Computation failed");
            }
        }

        entry
    }
}
