//! # Caching infrastructure
//!
//! Every value served by this service is expensive to compute, which is why it is cached
//! in-memory for a configurable time-to-live. This module contains all the code that deals with
//! that cache, our central [`CacheError`] type, and explains how concurrent lookups are handled.
//!
//! ## The cache stampede
//!
//! A naive cache-aside implementation looks into the cache, and on a miss computes the value and
//! puts it into the cache. When many callers look up the same key while it is missing or stale,
//! each of them observes the miss and starts a computation of its own, multiplying the load on
//! the backend by the number of concurrent callers.
//!
//! ## Layers
//!
//! - The [`EntryStore`] holds the last computed value of every key, along with the point in time
//!   it turns stale. It never blocks, and different keys never contend on a shared lock.
//! - The [`InFlight`] registry keeps track of running computations. The first caller for a key
//!   becomes its [`Leader`], every caller arriving while the leader is running becomes a
//!   [`Follower`] waiting for the leader's outcome.
//! - The [`Cacher`] ties both together: fresh values are returned right away, everything else goes
//!   through the registry, and only leaders ever call into the [`Backend`](crate::backend::Backend).
//!
//! A lookup goes through the following steps:
//! - First, it goes through the [`EntryStore`]. A fresh value is returned immediately.
//! - On a miss or a stale value, it joins or leads a computation via [`InFlight::join_or_lead`].
//! - A leader computes the value, stores it with the configured TTL, and then hands it to all of
//!   its followers. Errors are handed to the followers as well, but never stored.
//!
//! ### Metrics
//!
//! - `caches.access`: All lookups.
//! - `caches.memory.hit`: Lookups served by a fresh value.
//! - `caches.channel.hit`: Lookups that joined a running computation.
//! - `caches.channel.miss`: Lookups that started a new computation.
//! - `caches.computation`: Actual computations being run, tagged by `status`.
//!
//! ### Configuration
//!
//! [`CacheConfig`](crate::config::CacheConfig) controls the TTL, an optional computation timeout,
//! and whether concurrent misses are coalesced at all. Turning coalescing off via
//! [`CoalescingMode::Naive`](crate::config::CoalescingMode::Naive) reproduces the stampede.
//!
//! ## [`CacheEntry`] / [`CacheError`]
//!
//! Lookups return a [`CacheEntry`], which is just an alias for a [`Result`] around a
//! [`CacheError`]. [`CacheError::ComputationFailed`] carries the backend's error verbatim.
//! [`CacheError::Timeout`] and [`CacheError::Cancelled`] signal that a computation did not
//! complete, and [`CacheError::InternalError`] is a catch-all for the unexpected.

mod cache_error;
mod cacher;
mod inflight;
mod store;

pub use cache_error::{CacheEntry, CacheError};
pub use cacher::Cacher;
pub use inflight::{Follower, InFlight, Leader, Role};
pub use store::{EntryStore, StoredValue};
