//! Gumboard API: types, HTTP client and optimistic note operations.

mod client;
mod notes;
mod types;

pub use client::GumboardClient;
pub use notes::{NoteError, NoteService};
pub use types::{Board, BoardsPayload, Note, NotesPayload};
