use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::sync::VisibilityState;

/// Terminal events the watch loop cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal gained or lost focus (requires focus reporting)
  Focus(VisibilityState),
  /// Terminal was resized
  Resize,
}

impl Event {
  fn from_crossterm(evt: CrosstermEvent) -> Option<Self> {
    match evt {
      CrosstermEvent::Key(key) if key.kind != KeyEventKind::Release => Some(Event::Key(key)),
      CrosstermEvent::FocusGained => Some(Event::Focus(VisibilityState::Visible)),
      CrosstermEvent::FocusLost => Some(Event::Focus(VisibilityState::Hidden)),
      CrosstermEvent::Resize(..) => Some(Event::Resize),
      _ => None,
    }
  }
}

/// Reads terminal input on a blocking thread and forwards it as [`Event`]s
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// `poll_rate` bounds how long the reader takes to notice the handler was
  /// dropped.
  pub fn new(poll_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::task::spawn_blocking(move || {
      while !tx.is_closed() {
        if !event::poll(poll_rate).unwrap_or(false) {
          continue;
        }
        let Ok(evt) = event::read() else {
          continue;
        };
        if let Some(evt) = Event::from_crossterm(evt) {
          if tx.send(evt).is_err() {
            break;
          }
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
