//! Polling engine.
//!
//! Each subscribed resource gets a [`PollSession`] running as its own tokio
//! task. The session owns all of its state (interval, activity stamp, request
//! sequence, in-flight handle), so nothing inside it needs a lock: timer
//! expiry, visibility changes, activity, refresh requests and fetch results
//! are all handled one at a time from a single `select!` loop.
//!
//! Tick:
//! 1. Abort the previous request if it is still running and bump the sequence.
//! 2. Issue a conditional GET (no `If-None-Match` while the entry is stale).
//! 3. Drop the result if a newer request was issued in the meantime.
//! 4. 304: nothing changes. 200: hand the body to the cache and publish a
//!    [`PollUpdate`] if the displayed value changed.
//! 5. After any successful round trip, double the interval (up to the cap)
//!    once the user has been idle longer than the threshold.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::activity::{ActivityTracker, Visibility, VisibilityState};
use super::cache::{QueryCache, ServerApply};
use super::error::FetchError;
use super::fetch::{FetchOutcome, ResourceFetcher};
use super::fingerprint::{fingerprint, Fingerprint};
use super::key::ResourceKey;

/// Backoff tuning shared by all sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
  /// Ceiling for the adaptive interval
  pub max_interval: Duration,
  /// Idle time after which the interval starts to grow
  pub idle_threshold: Duration,
}

impl Default for PollConfig {
  fn default() -> Self {
    Self {
      max_interval: Duration::from_secs(10),
      idle_threshold: Duration::from_secs(30),
    }
  }
}

/// A new displayed value for a polled resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PollUpdate {
  pub key: ResourceKey,
  pub payload: Value,
  pub fingerprint: Fingerprint,
}

enum SessionCommand {
  Refresh,
}

struct SessionHandle {
  commands: mpsc::UnboundedSender<SessionCommand>,
  task: JoinHandle<()>,
}

/// Owns one polling loop per subscribed [`ResourceKey`].
pub struct PollingEngine<F: ResourceFetcher> {
  fetcher: Arc<F>,
  cache: Arc<QueryCache>,
  activity: ActivityTracker,
  visibility: Visibility,
  config: PollConfig,
  sessions: Mutex<HashMap<ResourceKey, SessionHandle>>,
}

impl<F: ResourceFetcher> PollingEngine<F> {
  pub fn new(
    fetcher: Arc<F>,
    cache: Arc<QueryCache>,
    activity: ActivityTracker,
    visibility: Visibility,
    config: PollConfig,
  ) -> Self {
    Self {
      fetcher,
      cache,
      activity,
      visibility,
      config,
      sessions: Mutex::new(HashMap::new()),
    }
  }

  fn sessions(&self) -> MutexGuard<'_, HashMap<ResourceKey, SessionHandle>> {
    self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Start polling `url` for `key`. Fetches immediately (when visible), then
  /// every `base_interval`, adapting to activity. A session already running
  /// for the key is replaced.
  pub fn start(
    &self,
    key: ResourceKey,
    url: Url,
    base_interval: Duration,
    on_update: mpsc::UnboundedSender<PollUpdate>,
  ) {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (results_tx, results_rx) = mpsc::unbounded_channel();

    let session = PollSession {
      key: key.clone(),
      url,
      base_interval,
      interval: base_interval,
      last_activity: self.activity.last_activity(),
      last_fingerprint: None,
      last_tick_at: Instant::now(),
      seq: 0,
      in_flight: None,
      fetcher: Arc::clone(&self.fetcher),
      cache: Arc::clone(&self.cache),
      config: self.config,
      on_update,
      results_tx,
    };

    let activity_rx = self.activity.subscribe();
    let visibility_rx = self.visibility.subscribe();
    let task = tokio::spawn(session.run(activity_rx, visibility_rx, command_rx, results_rx));

    info!(%key, interval_ms = base_interval.as_millis() as u64, "polling started");
    if let Some(previous) = self
      .sessions()
      .insert(key, SessionHandle { commands, task })
    {
      previous.task.abort();
    }
  }

  /// Stop polling `key`: cancels the timer and aborts any in-flight request.
  /// Returns `false` if nothing was polling it.
  pub fn stop(&self, key: &ResourceKey) -> bool {
    match self.sessions().remove(key) {
      Some(handle) => {
        handle.task.abort();
        info!(%key, "polling stopped");
        true
      }
      None => false,
    }
  }

  /// Ask the session for `key` to tick now. Ignored while hidden.
  pub fn refresh(&self, key: &ResourceKey) {
    if let Some(handle) = self.sessions().get(key) {
      let _ = handle.commands.send(SessionCommand::Refresh);
    }
  }

  pub fn shutdown(&self) {
    let sessions: Vec<_> = self.sessions().drain().collect();
    for (key, handle) in sessions {
      handle.task.abort();
      debug!(%key, "polling stopped at shutdown");
    }
  }
}

impl<F: ResourceFetcher> Drop for PollingEngine<F> {
  fn drop(&mut self) {
    self.shutdown();
  }
}

type FetchResult = Result<FetchOutcome, FetchError>;

/// Message from a request task back to its session.
struct Completed {
  seq: u64,
  issued_version: u64,
  result: FetchResult,
}

/// The request currently on the wire. Dropping it aborts the request task.
struct InFlight {
  seq: u64,
  task: JoinHandle<()>,
}

impl Drop for InFlight {
  fn drop(&mut self) {
    self.task.abort();
  }
}

struct PollSession<F: ResourceFetcher> {
  key: ResourceKey,
  url: Url,
  base_interval: Duration,
  interval: Duration,
  last_activity: Instant,
  last_fingerprint: Option<Fingerprint>,
  last_tick_at: Instant,
  seq: u64,
  in_flight: Option<InFlight>,
  fetcher: Arc<F>,
  cache: Arc<QueryCache>,
  config: PollConfig,
  on_update: mpsc::UnboundedSender<PollUpdate>,
  results_tx: mpsc::UnboundedSender<Completed>,
}

impl<F: ResourceFetcher> PollSession<F> {
  async fn run(
    mut self,
    mut activity_rx: watch::Receiver<Instant>,
    mut visibility_rx: watch::Receiver<VisibilityState>,
    mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    mut results_rx: mpsc::UnboundedReceiver<Completed>,
  ) {
    let mut visible = *visibility_rx.borrow_and_update() == VisibilityState::Visible;
    self.last_activity = *activity_rx.borrow_and_update();

    if visible {
      self.tick();
    }
    let mut next_tick = Instant::now() + self.interval;

    loop {
      tokio::select! {
        _ = sleep_until(next_tick), if visible => {
          self.tick();
          next_tick = self.last_tick_at + self.interval;
        }

        Some(done) = results_rx.recv() => {
          self.complete(done);
          // Backoff may have changed the interval.
          next_tick = self.last_tick_at + self.interval;
        }

        Ok(()) = visibility_rx.changed() => {
          let state = *visibility_rx.borrow_and_update();
          match state {
            VisibilityState::Hidden if visible => {
              visible = false;
              debug!(key = %self.key, "hidden, pausing");
            }
            VisibilityState::Visible if !visible => {
              visible = true;
              debug!(key = %self.key, "visible again, refreshing");
              // Coming back counts as activity: the hidden stretch must not
              // feed backoff.
              self.last_activity = Instant::now();
              self.interval = self.base_interval;
              self.tick();
              next_tick = self.last_tick_at + self.interval;
            }
            _ => {}
          }
        }

        Ok(()) = activity_rx.changed() => {
          self.last_activity = *activity_rx.borrow_and_update();
          if self.interval != self.base_interval {
            debug!(key = %self.key, "activity, interval reset to base");
            self.interval = self.base_interval;
          }
          next_tick = next_tick.min(self.last_tick_at + self.interval);
        }

        command = command_rx.recv() => match command {
          Some(SessionCommand::Refresh) if visible => {
            self.tick();
            next_tick = self.last_tick_at + self.interval;
          }
          Some(SessionCommand::Refresh) => {}
          None => break,
        },
      }
    }
  }

  fn tick(&mut self) {
    if let Some(previous) = self.in_flight.take() {
      debug!(key = %self.key, seq = previous.seq, "superseding in-flight request");
    }

    self.seq += 1;
    self.last_tick_at = Instant::now();

    let seq = self.seq;
    let issued_version = self.cache.version(&self.key);
    let etag = self.cache.conditional_etag(&self.key);
    let fetcher = Arc::clone(&self.fetcher);
    let url = self.url.clone();
    let results_tx = self.results_tx.clone();

    let task = tokio::spawn(async move {
      let result = fetcher.fetch(&url, etag.as_deref()).await;
      let _ = results_tx.send(Completed {
        seq,
        issued_version,
        result,
      });
    });
    self.in_flight = Some(InFlight { seq, task });
  }

  fn complete(&mut self, done: Completed) {
    if done.seq != self.seq {
      debug!(key = %self.key, seq = done.seq, latest = self.seq, "dropping superseded response");
      return;
    }
    self.in_flight = None;

    match done.result {
      Ok(FetchOutcome::NotModified) => {
        debug!(key = %self.key, "not modified");
      }
      Ok(FetchOutcome::Modified { body, etag }) => {
        let fp = fingerprint(&body);
        match self
          .cache
          .apply_server(&self.key, body, fp.clone(), etag, done.issued_version)
        {
          ServerApply::Changed { value, .. } => {
            debug!(
              key = %self.key,
              fingerprint = fp.short(),
              previous = self.last_fingerprint.as_ref().map(Fingerprint::short),
              "changed"
            );
            self.last_fingerprint = Some(fp.clone());
            let _ = self.on_update.send(PollUpdate {
              key: self.key.clone(),
              payload: value,
              fingerprint: fp,
            });
          }
          ServerApply::Unchanged => {
            self.last_fingerprint = Some(fp);
            debug!(key = %self.key, "unchanged");
          }
          ServerApply::Discarded => {
            debug!(key = %self.key, "written locally since request was issued, discarding");
          }
        }
      }
      Err(err) => {
        // Best effort: keep showing what we have and try again next tick.
        warn!(key = %self.key, error = %err, transient = err.is_transient(), "poll failed");
        return;
      }
    }

    self.adjust_interval();
  }

  fn adjust_interval(&mut self) {
    let idle = Instant::now().saturating_duration_since(self.last_activity);
    if idle > self.config.idle_threshold && self.interval < self.config.max_interval {
      self.interval = (self.interval * 2).min(self.config.max_interval);
      debug!(
        key = %self.key,
        idle_secs = idle.as_secs(),
        interval_ms = self.interval.as_millis() as u64,
        "idle, backing off"
      );
    }
  }
}
