//! The expensive computation that the cache protects.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};

use crate::caching::{CacheEntry, CacheError};
use crate::config::BackendConfig;

/// A slow computation deriving a value from a key.
///
/// Computations must be idempotent: a key may be computed again after a failure or once its
/// cached value expired.
pub trait Backend: Send + Sync + 'static {
    /// Computes the value for `key`.
    fn compute<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CacheEntry>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn compute<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CacheEntry> {
        (**self).compute(key)
    }
}

/// A [`Backend`] simulating a slow database call.
///
/// Every computation sleeps for the configured latency and then derives its value from a hash
/// of the key, so repeated computations of the same key yield the same value.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    latency: Duration,
    fail_prefix: Option<String>,
    computations: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            latency: config.latency,
            fail_prefix: config.fail_prefix.clone(),
            computations: AtomicUsize::new(0),
        }
    }

    /// Makes computations for keys starting with `prefix` fail.
    pub fn with_fail_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.fail_prefix = Some(prefix.into());
        self
    }

    /// The number of computations started so far.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }
}

/// Derives the value for `key`.
pub fn derive_value(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let fingerprint: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("expensive_result_for_{key}_{fingerprint}")
}

impl Backend for SimulatedBackend {
    fn compute<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CacheEntry> {
        self.computations.fetch_add(1, Ordering::SeqCst);
        tracing::info!(key, latency = ?self.latency, "Performing expensive computation");

        Box::pin(async move {
            tokio::time::sleep(self.latency).await;

            if let Some(prefix) = &self.fail_prefix {
                if key.starts_with(prefix.as_str()) {
                    tracing::warn!(key, "Expensive computation failed");
                    return Err(CacheError::ComputationFailed(format!(
                        "backend refused key `{key}`"
                    )));
                }
            }

            let value = derive_value(key);
            tracing::info!(key, value = %value, "Expensive computation completed");
            Ok(value)
        })
    }
}
