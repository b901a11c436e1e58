//! Serde types matching the Gumboard API.
//!
//! Fields the client does not use are kept in `extra` so that a note survives
//! a typed edit unchanged apart from what the edit touched. Timestamps stay
//! strings so they round-trip in the server's exact format.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
  pub id: String,
  pub content: String,
  #[serde(default)]
  pub checked: bool,
  #[serde(default)]
  pub order: i64,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteAuthor {
  pub id: String,
  pub name: Option<String>,
  pub email: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl NoteAuthor {
  pub fn display_name(&self) -> &str {
    self
      .name
      .as_deref()
      .or(self.email.as_deref())
      .unwrap_or("unknown")
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
  pub id: String,
  #[serde(default)]
  pub color: Option<String>,
  #[serde(default)]
  pub board_id: Option<String>,
  /// ISO 8601, as sent by the server
  #[serde(default)]
  pub archived_at: Option<String>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
  #[serde(default)]
  pub user: Option<NoteAuthor>,
  #[serde(default)]
  pub checklist_items: Vec<ChecklistItem>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Note {
  /// Notes created locally carry a `temp-` id until the server assigns one.
  pub fn is_pending(&self) -> bool {
    self.id.starts_with(TEMP_ID_PREFIX)
  }

  pub fn item(&self, item_id: &str) -> Option<&ChecklistItem> {
    self.checklist_items.iter().find(|i| i.id == item_id)
  }

  pub fn next_item_order(&self) -> i64 {
    self
      .checklist_items
      .iter()
      .map(|i| i.order)
      .max()
      .map_or(0, |o| o + 1)
  }
}

pub const TEMP_ID_PREFIX: &str = "temp-";

/// Response of `GET /api/boards/{id}/notes`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotesPayload {
  #[serde(default)]
  pub notes: Vec<Note>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Response of `POST`/`PUT` on a note.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteEnvelope {
  pub note: Note,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub is_public: bool,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Response of `GET /api/boards`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoardsPayload {
  #[serde(default)]
  pub boards: Vec<Board>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Body of `POST /api/boards/{id}/notes`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNote {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  pub checklist_items: Vec<NewChecklistItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewChecklistItem {
  pub content: String,
  pub checked: bool,
  pub order: i64,
}
