use std::collections::BTreeMap;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;

use super::{CacheEntry, CacheError};

type ComputationChannel = Shared<oneshot::Receiver<CacheEntry>>;
type ComputationMap = Arc<Mutex<BTreeMap<String, ComputationChannel>>>;

/// Keeps track of the computations that are currently running, one per key.
///
/// The first caller for a key becomes the [`Leader`] and is expected to run the computation.
/// Everyone arriving while the leader is still running becomes a [`Follower`] and waits for the
/// leader's outcome instead of starting a computation of their own.
#[derive(Clone, Default)]
pub struct InFlight {
    computations: ComputationMap,
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("running computations", &self.len())
            .finish()
    }
}

/// The part a caller plays in the computation for a key.
#[derive(Debug)]
pub enum Role {
    /// Runs the computation and settles the outcome for everyone.
    Leader(Leader),
    /// Waits for the outcome of a computation that is already running.
    Follower(Follower),
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Either attaches to the running computation for `key`, or registers a new one.
    ///
    /// Checking for and registering a computation happens under a single lock, so at most one
    /// caller per key is ever handed the [`Role::Leader`] until that leader settles.
    pub fn join_or_lead(&self, key: &str) -> Role {
        let mut computations = self.computations.lock();

        if let Some(channel) = computations.get(key) {
            return Role::Follower(Follower {
                channel: channel.clone(),
            });
        }

        let (sender, receiver) = oneshot::channel();
        computations.insert(key.to_owned(), receiver.shared());

        Role::Leader(Leader {
            key: key.to_owned(),
            sender: Some(sender),
            computations: Arc::clone(&self.computations),
        })
    }

    /// The number of computations currently running.
    pub fn len(&self) -> usize {
        self.computations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The caller responsible for computing the value of a key.
///
/// The outcome is settled exactly once, either explicitly via [`resolve`](Self::resolve) and
/// [`fail`](Self::fail), or with [`CacheError::Cancelled`] when the leader is dropped before
/// that. In all cases the computation is removed from the registry *before* the followers are
/// woken up, so that later callers start a fresh computation.
pub struct Leader {
    key: String,
    sender: Option<oneshot::Sender<CacheEntry>>,
    computations: ComputationMap,
}

impl std::fmt::Debug for Leader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leader").field("key", &self.key).finish()
    }
}

impl Leader {
    /// The key this leader computes.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Hands `value` to all followers.
    pub fn resolve(mut self, value: String) {
        self.settle(Ok(value));
    }

    /// Hands `error` to all followers.
    pub fn fail(mut self, error: CacheError) {
        self.settle(Err(error));
    }

    fn settle(&mut self, entry: CacheEntry) {
        let Some(sender) = self.sender.take() else {
            return;
        };

        let evicted = self.computations.lock().remove(&self.key);
        debug_assert!(evicted.is_some());

        // Followers may all have gone away already, which is fine.
        sender.send(entry).ok();
    }
}

impl Drop for Leader {
    fn drop(&mut self) {
        if self.sender.is_some() {
            tracing::debug!(key = %self.key, "Leader dropped before settling");
            self.settle(Err(CacheError::Cancelled));
        }
    }
}

/// A caller waiting for the computation of another caller.
#[derive(Debug)]
pub struct Follower {
    channel: ComputationChannel,
}

impl Follower {
    /// Waits for the leader to settle, and returns its outcome.
    ///
    /// Dropping the returned future only stops this follower from waiting, it does not affect
    /// the leader or any other follower.
    pub async fn wait(self) -> CacheEntry {
        // The leader always settles before its sender goes away, even when it is dropped.
        self.channel.await.unwrap_or_else(|e| Err(CacheError::from_std_error(e)))
    }
}
