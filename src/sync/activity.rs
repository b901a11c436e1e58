//! User activity and visibility signals that steer polling.
//!
//! Both are plain observers over `watch` channels: the terminal event pump
//! writes to them, poll sessions read from them. Nothing here is persisted.

use tokio::sync::watch;
use tokio::time::Instant;

/// Last-interaction timestamp shared across the process.
#[derive(Clone)]
pub struct ActivityTracker {
  tx: watch::Sender<Instant>,
}

impl ActivityTracker {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(Instant::now());
    Self { tx }
  }

  /// Stamp "the user just did something".
  pub fn record(&self) {
    self.tx.send_replace(Instant::now());
  }

  pub fn last_activity(&self) -> Instant {
    *self.tx.borrow()
  }

  pub fn subscribe(&self) -> watch::Receiver<Instant> {
    self.tx.subscribe()
  }
}

impl Default for ActivityTracker {
  fn default() -> Self {
    Self::new()
  }
}

/// Whether the hosting UI is currently in front of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
  Visible,
  Hidden,
}

/// Shared visibility flag. Starts out visible.
#[derive(Clone)]
pub struct Visibility {
  tx: watch::Sender<VisibilityState>,
}

impl Visibility {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(VisibilityState::Visible);
    Self { tx }
  }

  /// Update the state; receivers are only woken on an actual change.
  pub fn set(&self, state: VisibilityState) {
    self.tx.send_if_modified(|current| {
      if *current == state {
        false
      } else {
        *current = state;
        true
      }
    });
  }

  pub fn get(&self) -> VisibilityState {
    *self.tx.borrow()
  }

  pub fn is_visible(&self) -> bool {
    self.get() == VisibilityState::Visible
  }

  pub fn subscribe(&self) -> watch::Receiver<VisibilityState> {
    self.tx.subscribe()
  }
}

impl Default for Visibility {
  fn default() -> Self {
    Self::new()
  }
}
