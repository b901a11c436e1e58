//! Plain-text views of cached board data.

use crate::gumboard::{Board, Note, NotesPayload};

pub fn note_lines(note: &Note) -> Vec<String> {
  let mut header = note.id.clone();
  if note.is_pending() {
    header.push_str(" (saving)");
  }
  if let Some(color) = &note.color {
    header.push_str(&format!(" {}", color));
  }
  if let Some(user) = &note.user {
    header.push_str(&format!(" by {}", user.display_name()));
  }

  let mut items: Vec<_> = note.checklist_items.iter().collect();
  items.sort_by_key(|i| i.order);

  let mut lines = vec![header];
  lines.extend(items.into_iter().map(|item| {
    let mark = if item.checked { "x" } else { " " };
    format!("  [{}] {}  ({})", mark, item.content, item.id)
  }));
  lines
}

pub fn notes_lines(payload: &NotesPayload) -> Vec<String> {
  let active: Vec<_> = payload
    .notes
    .iter()
    .filter(|n| n.archived_at.is_none())
    .collect();
  if active.is_empty() {
    return vec!["(no notes)".to_string()];
  }
  active.into_iter().flat_map(note_lines).collect()
}

pub fn board_lines(boards: &[Board]) -> Vec<String> {
  if boards.is_empty() {
    return vec!["(no boards)".to_string()];
  }
  boards
    .iter()
    .map(|b| match &b.description {
      Some(d) if !d.is_empty() => format!("{}  {}  - {}", b.id, b.name, d),
      _ => format!("{}  {}", b.id, b.name),
    })
    .collect()
}
