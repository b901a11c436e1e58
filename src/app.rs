use color_eyre::{eyre::eyre, Result};
use crossterm::cursor::MoveTo;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use std::io::{stdout, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::event::{Event, EventHandler};
use crate::gumboard::NotesPayload;
use crate::render;
use crate::sync::{PollUpdate, ResourceFetcher, ResourceKey, SyncCoordinator};

/// Live view of one board's notes
pub struct App<F: ResourceFetcher> {
  sync: Arc<SyncCoordinator<F>>,
  key: ResourceKey,
  url: Url,
  base_interval: Duration,

  /// Last payload received, if it decoded
  notes: Option<NotesPayload>,

  /// One-line status shown under the notes
  status: String,

  should_quit: bool,
}

impl<F: ResourceFetcher> App<F> {
  pub fn new(
    sync: Arc<SyncCoordinator<F>>,
    board_id: &str,
    url: Url,
    base_interval: Duration,
  ) -> Self {
    let key = ResourceKey::notes(board_id);
    let notes = sync.cache().get_as(&key);
    Self {
      sync,
      key,
      url,
      base_interval,
      notes,
      status: "q quit, r refresh".to_string(),
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen, EnableFocusChange)?;

    let result = self.event_loop().await;

    self.sync.unwatch(&self.key);
    execute!(stdout(), DisableFocusChange, LeaveAlternateScreen)?;
    disable_raw_mode()?;

    result
  }

  async fn event_loop(&mut self) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(250));
    let mut updates = self
      .sync
      .watch(self.key.clone(), self.url.clone(), self.base_interval);
    info!(key = %self.key, "watching");

    self.draw()?;
    while !self.should_quit {
      tokio::select! {
        event = events.next() => match event {
          Some(event) => self.handle_event(event),
          None => return Err(eyre!("Terminal input closed")),
        },
        update = updates.recv() => match update {
          Some(update) => self.handle_update(update),
          None => return Err(eyre!("Polling for {} stopped", self.key)),
        },
      }
      self.draw()?;
    }
    Ok(())
  }

  fn draw(&self) -> Result<()> {
    let mut out = stdout();
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    // Raw mode: no implicit carriage return.
    for line in self.lines() {
      write!(out, "{}\r\n", line)?;
    }
    out.flush()?;
    Ok(())
  }

  fn lines(&self) -> Vec<String> {
    let mut lines = vec![format!("Board {}", self.key.id), String::new()];
    match &self.notes {
      Some(notes) => lines.extend(render::notes_lines(notes)),
      None => lines.push("Loading...".to_string()),
    }
    lines.push(String::new());
    lines.push(self.status.clone());
    if !self.sync.visibility().is_visible() {
      lines.push("Paused while the terminal is unfocused".to_string());
    }
    lines
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => {
        self.sync.activity().record();
        self.handle_key(key);
      }
      Event::Focus(state) => {
        debug!(?state, "terminal focus changed");
        self.sync.visibility().set(state);
      }
      Event::Resize => {}
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }
      KeyCode::Char('r') => {
        self.sync.engine().refresh(&self.key);
        self.status = "Refreshing...".to_string();
      }
      _ => {}
    }
  }

  fn handle_update(&mut self, update: PollUpdate) {
    match serde_json::from_value::<NotesPayload>(update.payload) {
      Ok(notes) => {
        self.status = self.status_line(notes.notes.len(), update.fingerprint.short());
        self.notes = Some(notes);
      }
      Err(e) => self.status = format!("Unreadable notes payload: {}", e),
    }
  }

  fn status_line(&self, count: usize, fingerprint: &str) -> String {
    let mut status = format!("{} notes ({})", count, fingerprint);
    let Some(meta) = self.sync.cache().meta(&self.key) else {
      return status;
    };
    if let Some(synced_at) = meta.synced_at {
      let local = synced_at.with_timezone(&chrono::Local);
      status.push_str(&format!(", synced {}", local.format("%H:%M:%S")));
    }
    if meta.pending > 0 {
      status.push_str(&format!(", saving {}", meta.pending));
    }
    if meta.stale {
      status.push_str(", refreshing");
    }
    status
  }
}
