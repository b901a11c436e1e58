mod app;
mod config;
mod event;
mod gumboard;
mod logging;
mod render;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::gumboard::{BoardsPayload, GumboardClient, NoteError, NoteService, NotesPayload};
use crate::sync::{CacheEvent, HttpFetcher, PollConfig, ResourceKey, SyncCoordinator};

#[derive(Parser, Debug)]
#[command(name = "gumboard-sync")]
#[command(about = "A terminal client for Gumboard with live updates")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/gumboard-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Board id to use
  #[arg(short, long)]
  board: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Keep the board's notes on screen, updating as they change
  Watch,
  /// List the board's notes once
  Notes,
  /// List boards
  Boards,
  /// Create a note with one checklist item
  Add {
    content: String,
    #[arg(long)]
    color: Option<String>,
  },
  /// Archive a note
  Archive { note_id: String },
  /// Delete a note
  Delete { note_id: String },
  /// Change a note's color
  Color { note_id: String, color: String },
  /// Check or uncheck a checklist item
  Toggle { note_id: String, item_id: String },
  /// Append a checklist item to a note
  AddItem { note_id: String, content: String },
}

type Coordinator = SyncCoordinator<HttpFetcher>;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override board if specified on command line
  let config = if let Some(board) = args.board {
    config::Config {
      default_board: Some(board),
      ..config
    }
  } else {
    config
  };

  let _log_guard = logging::init(&config.logging)?;

  let client = GumboardClient::new(&config)?;
  let sync = Arc::new(SyncCoordinator::new(
    client.fetcher(),
    PollConfig::from(&config.polling),
  ));

  let result = run(args.command, &config, &client, &sync).await;
  sync.shutdown();
  result
}

async fn run(
  command: Command,
  config: &config::Config,
  client: &GumboardClient,
  sync: &Arc<Coordinator>,
) -> Result<()> {
  match command {
    Command::Boards => {
      let boards = load_boards(client, sync).await?;
      print_lines(render::board_lines(&boards.boards));
    }
    Command::Watch => {
      let board = config.board()?;
      let key = ResourceKey::notes(board);
      let url = client.resource_url(&key);
      load_notes(sync, &key, &url).await?;
      let interval = config.polling.base_interval();
      let mut app = app::App::new(Arc::clone(sync), board, url, interval);
      app.run().await?;
    }
    Command::Notes => {
      let board = config.board()?;
      let key = ResourceKey::notes(board);
      let url = client.resource_url(&key);
      let (boards, notes) =
        futures::try_join!(load_boards(client, sync), load_notes(sync, &key, &url))?;
      let name = boards
        .boards
        .iter()
        .find(|b| b.id == board)
        .map_or(board, |b| b.name.as_str());
      println!("{}\n", name);
      print_lines(render::notes_lines(&notes));
    }
    Command::Add { content, color } => {
      let (board, notes) = note_service(config, client, sync).await?;
      let created = with_optimistic_view(
        sync,
        board,
        notes.create_note(board, &content, color.as_deref()),
      )
      .await?;
      println!("Created note {}", created.id);
    }
    Command::Archive { note_id } => {
      let (board, notes) = note_service(config, client, sync).await?;
      with_optimistic_view(sync, board, notes.archive_note(board, &note_id)).await?;
      println!("Archived note {}", note_id);
    }
    Command::Delete { note_id } => {
      let (board, notes) = note_service(config, client, sync).await?;
      with_optimistic_view(sync, board, notes.delete_note(board, &note_id)).await?;
      println!("Deleted note {}", note_id);
    }
    Command::Color { note_id, color } => {
      let (board, notes) = note_service(config, client, sync).await?;
      with_optimistic_view(sync, board, notes.update_color(board, &note_id, &color)).await?;
      println!("Note {} is now {}", note_id, color);
    }
    Command::Toggle { note_id, item_id } => {
      let (board, notes) = note_service(config, client, sync).await?;
      let checked =
        with_optimistic_view(sync, board, notes.toggle_item(board, &note_id, &item_id)).await?;
      let state = if checked { "checked" } else { "unchecked" };
      println!("Item {} {}", item_id, state);
    }
    Command::AddItem { note_id, content } => {
      let (board, notes) = note_service(config, client, sync).await?;
      with_optimistic_view(sync, board, notes.add_item(board, &note_id, &content)).await?;
      println!("Added item to note {}", note_id);
    }
  }
  Ok(())
}

/// Load the board's notes so there is something to patch, then hand out the
/// service that patches them.
async fn note_service<'a>(
  config: &'a config::Config,
  client: &GumboardClient,
  sync: &Arc<Coordinator>,
) -> Result<(&'a str, NoteService<HttpFetcher>)> {
  let board = config.board()?;
  let key = ResourceKey::notes(board);
  load_notes(sync, &key, &client.resource_url(&key)).await?;
  Ok((board, NoteService::new(Arc::clone(sync), client.clone())))
}

async fn load_notes(sync: &Coordinator, key: &ResourceKey, url: &url::Url) -> Result<NotesPayload> {
  let value = sync
    .load(key, url)
    .await
    .map_err(|e| eyre!("Failed to load notes: {}", e.user_message()))?;
  serde_json::from_value(value).map_err(|e| eyre!("Failed to parse notes: {}", e))
}

async fn load_boards(client: &GumboardClient, sync: &Coordinator) -> Result<BoardsPayload> {
  let key = ResourceKey::boards();
  let value = sync
    .load(&key, &client.resource_url(&key))
    .await
    .map_err(|e| eyre!("Failed to load boards: {}", e.user_message()))?;
  serde_json::from_value(value).map_err(|e| eyre!("Failed to parse boards: {}", e))
}

/// Run a note operation, printing the optimistic state as soon as it lands
/// and the settled (or rolled back) state afterwards.
async fn with_optimistic_view<T>(
  sync: &Coordinator,
  board: &str,
  operation: impl Future<Output = std::result::Result<T, NoteError>>,
) -> Result<T> {
  let key = &ResourceKey::notes(board);
  let mut events = sync.cache().subscribe();
  tokio::pin!(operation);

  let mut shown = false;
  let result = loop {
    tokio::select! {
      result = &mut operation => break result,
      event = events.recv(), if !shown => match event {
        Ok(CacheEvent::Updated { key: updated, .. }) if &updated == key => {
          print_section("Pending", sync, key);
          shown = true;
        }
        Ok(_) | Err(RecvError::Lagged(_)) => {}
        Err(RecvError::Closed) => shown = true,
      },
    }
  };

  match result {
    Ok(value) => {
      print_section("Saved", sync, key);
      Ok(value)
    }
    Err(e) => {
      // Nothing to show if the write never reached the cache.
      if shown {
        print_section("Reverted", sync, key);
      }
      Err(eyre!("{}", e.user_message()))
    }
  }
}

fn print_section(title: &str, sync: &Coordinator, key: &ResourceKey) {
  println!("-- {} --", title);
  match sync.cache().get_as::<NotesPayload>(key) {
    Some(notes) => print_lines(render::notes_lines(&notes)),
    None => println!("(not loaded)"),
  }
  println!();
}

fn print_lines(lines: Vec<String>) {
  for line in lines {
    println!("{}", line);
  }
}
