use std::time::Duration;

use tokio::time::Instant;

/// A value saved in the [`EntryStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredValue {
    /// The computed value.
    pub value: String,
    /// The point in time at which this value turns stale.
    pub expires_at: Instant,
}

impl StoredValue {
    /// Whether this value is still within its TTL.
    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// A concurrent mapping from keys to their last computed value.
///
/// Expiry is purely logical: stale values stay in the store until they are overwritten by the
/// next computation for the same key. The underlying [`moka`] cache is sharded, so accesses to
/// different keys never contend on a common lock.
#[derive(Clone)]
pub struct EntryStore {
    entries: moka::sync::Cache<String, StoredValue>,
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryStore {
    pub fn new() -> Self {
        let entries = moka::sync::Cache::builder().name("entries").build();
        Self { entries }
    }

    /// Returns the stored value for `key`, whether fresh or stale.
    ///
    /// A missing key is a normal outcome and yields `None`.
    pub fn get(&self, key: &str) -> Option<StoredValue> {
        self.entries.get(key)
    }

    /// Replaces the value for `key`, keeping it fresh for `ttl`.
    pub fn put(&self, key: &str, value: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .insert(key.to_owned(), StoredValue { value, expires_at });
    }
}
