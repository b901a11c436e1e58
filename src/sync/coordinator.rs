//! Process-wide owner of the sync state.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use super::activity::{ActivityTracker, Visibility};
use super::cache::{QueryCache, ServerApply};
use super::engine::{PollConfig, PollUpdate, PollingEngine};
use super::error::{FetchError, MutationError};
use super::fetch::{FetchOutcome, ResourceFetcher};
use super::fingerprint::fingerprint;
use super::key::ResourceKey;
use super::mutation::{Mutation, Mutator};

/// Created once at start-up and handed to consumers by reference. Owns the
/// cache, the polling engine, the mutation queue and the activity/visibility
/// signals; dropping it stops all polling.
pub struct SyncCoordinator<F: ResourceFetcher> {
  fetcher: Arc<F>,
  cache: Arc<QueryCache>,
  engine: PollingEngine<F>,
  mutator: Mutator,
  activity: ActivityTracker,
  visibility: Visibility,
}

impl<F: ResourceFetcher> SyncCoordinator<F> {
  pub fn new(fetcher: F, config: PollConfig) -> Self {
    let fetcher = Arc::new(fetcher);
    let cache = Arc::new(QueryCache::new());
    let activity = ActivityTracker::new();
    let visibility = Visibility::new();
    let engine = PollingEngine::new(
      Arc::clone(&fetcher),
      Arc::clone(&cache),
      activity.clone(),
      visibility.clone(),
      config,
    );
    let mutator = Mutator::new(Arc::clone(&cache));

    Self {
      fetcher,
      cache,
      engine,
      mutator,
      activity,
      visibility,
    }
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  pub fn activity(&self) -> &ActivityTracker {
    &self.activity
  }

  pub fn visibility(&self) -> &Visibility {
    &self.visibility
  }

  pub fn engine(&self) -> &PollingEngine<F> {
    &self.engine
  }

  /// Fetch `key` once, unconditionally, and return what the cache now holds.
  pub async fn load(&self, key: &ResourceKey, url: &Url) -> Result<Value, FetchError> {
    let issued_version = self.cache.version(key);
    match self.fetcher.fetch(url, None).await? {
      FetchOutcome::Modified { body, etag } => {
        let fp = fingerprint(&body);
        match self
          .cache
          .apply_server(key, body.clone(), fp, etag, issued_version)
        {
          ServerApply::Changed { value, .. } => Ok(value),
          ServerApply::Unchanged | ServerApply::Discarded => {
            Ok(self.cache.get(key).unwrap_or(body))
          }
        }
      }
      // Without an ETag the server has no reason to answer 304, but if it
      // does, whatever is cached is current.
      FetchOutcome::NotModified => self.cache.get(key).ok_or_else(|| FetchError::Http {
        status: 304,
        message: Some(format!("{key} was not modified but nothing is cached")),
      }),
    }
  }

  /// Start polling `key`; updates arrive on the returned channel.
  pub fn watch(
    &self,
    key: ResourceKey,
    url: Url,
    base_interval: Duration,
  ) -> mpsc::UnboundedReceiver<PollUpdate> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.engine.start(key, url, base_interval, tx);
    rx
  }

  /// Stop polling `key` and forget what was cached for it, so a later
  /// `watch` starts from a fresh fetch.
  pub fn unwatch(&self, key: &ResourceKey) {
    let stopped = self.engine.stop(key);
    let evicted = self.cache.remove(key);
    debug!(%key, stopped, evicted, "unwatched");
  }

  /// Run an optimistic mutation. Once it settles either way, the polling
  /// session for the key (if any) is asked to fetch canonical state right
  /// away.
  pub async fn mutate<R, Fut>(&self, mutation: Mutation, request: R) -> Result<Value, MutationError>
  where
    R: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, FetchError>>,
  {
    let key = mutation.key().clone();
    let result = self.mutator.mutate(mutation, request).await;
    debug!(%key, ok = result.is_ok(), "mutation settled, refreshing");
    self.engine.refresh(&key);
    result
  }

  /// Stop all polling and drop every cache entry.
  pub fn shutdown(&self) {
    self.engine.shutdown();
    let keys = self.cache.keys();
    for key in &keys {
      self.cache.remove(key);
    }
    debug!(entries = keys.len(), "sync state torn down");
  }
}
