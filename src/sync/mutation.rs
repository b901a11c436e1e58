//! Optimistic mutations.
//!
//! A mutation patches the cache right away, then sends its request. Requests
//! for the same key go out one at a time in submission order, so the server
//! sees writes in the order the user made them and settles happen in that
//! order too.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use super::cache::{PatchId, QueryCache, SettleTransform, Transform};
use super::error::{FetchError, MutationError};
use super::key::ResourceKey;

/// Description of an optimistic write against one cached resource.
#[derive(Clone)]
pub struct Mutation {
  key: ResourceKey,
  forward: Transform,
  settle: Option<SettleTransform>,
}

impl Mutation {
  /// `forward` turns the cached payload into the optimistic one.
  pub fn new<F>(key: ResourceKey, forward: F) -> Self
  where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
  {
    Self {
      key,
      forward: Arc::new(forward),
      settle: None,
    }
  }

  /// Fold the server response into the cache when the request succeeds
  /// (e.g. swap a temporary id for the real one).
  pub fn on_settle<F>(mut self, settle: F) -> Self
  where
    F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
  {
    self.settle = Some(Arc::new(settle));
    self
  }

  pub fn key(&self) -> &ResourceKey {
    &self.key
  }
}

type Queues = Mutex<HashMap<ResourceKey, Arc<tokio::sync::Mutex<()>>>>;

/// Applies [`Mutation`]s against a shared [`QueryCache`].
pub struct Mutator {
  cache: Arc<QueryCache>,
  /// Per-key request queues, present only while a mutation for the key runs.
  queues: Queues,
}

impl Mutator {
  pub fn new(cache: Arc<QueryCache>) -> Self {
    Self {
      cache,
      queues: Mutex::new(HashMap::new()),
    }
  }

  fn queue_for(&self, key: &ResourceKey) -> Arc<tokio::sync::Mutex<()>> {
    let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(queues.entry(key.clone()).or_default())
  }

  /// Apply `mutation` optimistically and run `request`.
  ///
  /// On success the server response is returned, the settle transform (if
  /// any) is applied and the entry is invalidated. On failure the optimistic
  /// write is undone and the error is returned for the caller to report.
  pub async fn mutate<R, Fut>(&self, mutation: Mutation, request: R) -> Result<Value, MutationError>
  where
    R: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, FetchError>>,
  {
    let Mutation {
      key,
      forward,
      settle,
    } = mutation;

    let id = self.cache.apply_patch(&key, forward)?;
    let mut pending = PendingGuard {
      cache: &self.cache,
      key: &key,
      id,
      sent: false,
      settled: false,
    };

    // Declared before the queue handle so it is dropped after it.
    let _slot = QueueSlot {
      queues: &self.queues,
      key: &key,
    };
    // tokio's Mutex is FIFO, so requests leave in the order patches were applied.
    let queue = self.queue_for(&key);
    let _turn = queue.lock().await;

    pending.sent = true;
    let result = request().await;
    pending.settled = true;

    match result {
      Ok(response) => {
        self
          .cache
          .commit_patch(&key, id, Some(&response), settle.as_ref());
        Ok(response)
      }
      Err(err) => {
        let outcome = self.cache.rollback_patch(&key, id);
        warn!(%key, error = %err, ?outcome, "mutation failed");
        Err(MutationError::Request(err))
      }
    }
  }
}

/// Settles a patch whose mutation future was dropped before the request came
/// back. A request that was never sent is rolled back. One that was sent may
/// or may not have reached the server, so its optimistic value is kept and the
/// entry invalidated.
struct PendingGuard<'a> {
  cache: &'a QueryCache,
  key: &'a ResourceKey,
  id: PatchId,
  sent: bool,
  settled: bool,
}

impl Drop for PendingGuard<'_> {
  fn drop(&mut self) {
    if self.settled {
      return;
    }
    if self.sent {
      debug!(key = %self.key, "mutation dropped in flight");
      self.cache.commit_patch(self.key, self.id, None, None);
    } else {
      debug!(key = %self.key, "mutation dropped while queued");
      self.cache.rollback_patch(self.key, self.id);
    }
  }
}

/// Forgets the key's queue once no mutation holds or waits on it.
struct QueueSlot<'a> {
  queues: &'a Queues,
  key: &'a ResourceKey,
}

impl Drop for QueueSlot<'_> {
  fn drop(&mut self) {
    let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
    if queues
      .get(self.key)
      .is_some_and(|queue| Arc::strong_count(queue) == 1)
    {
      queues.remove(self.key);
    }
  }
}

impl std::fmt::Debug for Mutation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Mutation")
      .field("key", &self.key)
      .field("settle", &self.settle.is_some())
      .finish_non_exhaustive()
  }
}
