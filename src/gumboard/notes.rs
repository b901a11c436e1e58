//! Optimistic note operations.
//!
//! Every operation patches the cached notes payload of its board first and
//! then sends the write. Edits touch only the affected note; the rest of the
//! payload is left exactly as the server sent it.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::sync::{MutationError, Mutation, ResourceFetcher, ResourceKey, SyncCoordinator};

use super::client::{note_from_response, GumboardClient};
use super::types::{
  ChecklistItem, CreateNote, NewChecklistItem, Note, NotesPayload, TEMP_ID_PREFIX,
};

#[derive(Debug, Error)]
pub enum NoteError {
  #[error("note {0} not found")]
  NoteNotFound(String),

  #[error("checklist item {item_id} not found on note {note_id}")]
  ItemNotFound { note_id: String, item_id: String },

  #[error(transparent)]
  Mutation(#[from] MutationError),
}

impl NoteError {
  pub fn user_message(&self) -> String {
    match self {
      NoteError::Mutation(err) => err.user_message(),
      other => other.to_string(),
    }
  }
}

/// Note writes for one Gumboard deployment.
pub struct NoteService<F: ResourceFetcher> {
  sync: Arc<SyncCoordinator<F>>,
  client: GumboardClient,
}

impl<F: ResourceFetcher> NoteService<F> {
  pub fn new(sync: Arc<SyncCoordinator<F>>, client: GumboardClient) -> Self {
    Self { sync, client }
  }

  fn find_note(&self, board_id: &str, note_id: &str) -> Result<Note, NoteError> {
    let key = ResourceKey::notes(board_id);
    let payload: NotesPayload = self
      .sync
      .cache()
      .get_as(&key)
      .ok_or_else(|| MutationError::NotCached(key))?;
    payload
      .notes
      .into_iter()
      .find(|n| n.id == note_id)
      .ok_or_else(|| NoteError::NoteNotFound(note_id.to_string()))
  }

  /// Add a note with a single checklist item. Returns the server's note.
  pub async fn create_note(
    &self,
    board_id: &str,
    content: &str,
    color: Option<&str>,
  ) -> Result<Note, NoteError> {
    let temp = temp_note(board_id, content, color);
    info!(board_id, temp_id = %temp.id, "creating note");

    let body = CreateNote {
      color: color.map(String::from),
      checklist_items: vec![NewChecklistItem {
        content: content.to_string(),
        checked: false,
        order: 0,
      }],
    };
    let response = self
      .sync
      .mutate(create_mutation(board_id, &temp), || {
        self.client.create_note(board_id, &body)
      })
      .await?;
    note_from_response(&response).map_err(|e| NoteError::Mutation(e.into()))
  }

  /// Archive a note. It disappears from the list right away and comes back
  /// in its old place if the server refuses.
  pub async fn archive_note(&self, board_id: &str, note_id: &str) -> Result<(), NoteError> {
    self.find_note(board_id, note_id)?;
    let archived_at = now_iso();
    info!(board_id, note_id, "archiving note");

    self
      .sync
      .mutate(remove_mutation(board_id, note_id), || {
        self.client.archive_note(board_id, note_id, &archived_at)
      })
      .await?;
    Ok(())
  }

  pub async fn delete_note(&self, board_id: &str, note_id: &str) -> Result<(), NoteError> {
    self.find_note(board_id, note_id)?;
    info!(board_id, note_id, "deleting note");

    self
      .sync
      .mutate(remove_mutation(board_id, note_id), || {
        self.client.delete_note(board_id, note_id)
      })
      .await?;
    Ok(())
  }

  pub async fn update_color(
    &self,
    board_id: &str,
    note_id: &str,
    color: &str,
  ) -> Result<(), NoteError> {
    self.find_note(board_id, note_id)?;
    let changes = json!({ "color": color });

    self
      .sync
      .mutate(color_mutation(board_id, note_id, color), || {
        self.client.update_note(board_id, note_id, &changes)
      })
      .await?;
    Ok(())
  }

  /// Flip a checklist item. The server takes the whole checklist, so the
  /// request carries every item with the one flipped.
  pub async fn toggle_item(
    &self,
    board_id: &str,
    note_id: &str,
    item_id: &str,
  ) -> Result<bool, NoteError> {
    let note = self.find_note(board_id, note_id)?;
    let checked = note
      .item(item_id)
      .map(|i| !i.checked)
      .ok_or_else(|| NoteError::ItemNotFound {
        note_id: note_id.to_string(),
        item_id: item_id.to_string(),
      })?;

    let items: Vec<ChecklistItem> = note
      .checklist_items
      .into_iter()
      .map(|mut i| {
        if i.id == item_id {
          i.checked = checked;
        }
        i
      })
      .collect();
    let changes = json!({ "checklistItems": items });

    self
      .sync
      .mutate(
        item_checked_mutation(board_id, note_id, item_id, checked),
        || self.client.update_note(board_id, note_id, &changes),
      )
      .await?;
    Ok(checked)
  }

  pub async fn add_item(
    &self,
    board_id: &str,
    note_id: &str,
    content: &str,
  ) -> Result<(), NoteError> {
    let note = self.find_note(board_id, note_id)?;
    let item = ChecklistItem {
      id: temp_id(),
      content: content.to_string(),
      checked: false,
      order: note.next_item_order(),
      extra: Map::new(),
    };

    // Existing items keep their ids; the new one is sent without.
    let mut items: Vec<Value> = note
      .checklist_items
      .iter()
      .filter_map(|i| serde_json::to_value(i).ok())
      .collect();
    items.push(json!({ "content": item.content, "checked": false, "order": item.order }));
    let changes = json!({ "checklistItems": items });

    self
      .sync
      .mutate(add_item_mutation(board_id, note_id, item), || {
        self.client.update_note(board_id, note_id, &changes)
      })
      .await?;
    Ok(())
  }
}

fn now_iso() -> String {
  Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn temp_id() -> String {
  format!("{}{}", TEMP_ID_PREFIX, hex::encode(rand::random::<[u8; 8]>()))
}

fn temp_note(board_id: &str, content: &str, color: Option<&str>) -> Note {
  let id = temp_id();
  let now = now_iso();
  Note {
    checklist_items: vec![ChecklistItem {
      id: format!("{}-item", id),
      content: content.to_string(),
      checked: false,
      order: 0,
      extra: Map::new(),
    }],
    id,
    color: color.map(String::from),
    board_id: Some(board_id.to_string()),
    archived_at: None,
    created_at: Some(now.clone()),
    updated_at: Some(now),
    user: None,
    extra: Map::new(),
  }
}

// Payload edits. These are pure functions of the cached value so that the
// cache can replay them on top of fresh server data.

fn id_of(note: &Value) -> Option<&str> {
  note.get("id").and_then(Value::as_str)
}

fn edit_notes(value: &Value, edit: impl FnOnce(&mut Vec<Value>)) -> Value {
  let mut value = value.clone();
  match value.get_mut("notes").and_then(Value::as_array_mut) {
    Some(notes) => edit(notes),
    None => debug!("cached payload has no notes array, leaving it alone"),
  }
  value
}

fn edit_note(value: &Value, note_id: &str, edit: impl FnOnce(&mut Note)) -> Value {
  edit_notes(value, |notes| {
    let Some(slot) = notes.iter_mut().find(|n| id_of(n) == Some(note_id)) else {
      return;
    };
    match serde_json::from_value::<Note>(slot.clone()) {
      Ok(mut note) => {
        edit(&mut note);
        if let Ok(updated) = serde_json::to_value(&note) {
          *slot = updated;
        }
      }
      Err(e) => debug!(note_id, error = %e, "cached note does not decode, leaving it alone"),
    }
  })
}

fn push_note(value: &Value, note: &Value) -> Value {
  edit_notes(value, |notes| {
    if !notes.iter().any(|n| id_of(n) == id_of(note)) {
      notes.push(note.clone());
    }
  })
}

fn remove_note(value: &Value, note_id: &str) -> Value {
  edit_notes(value, |notes| notes.retain(|n| id_of(n) != Some(note_id)))
}

/// Put `server` where `note_id` was. If a poll already brought the server
/// note in, the placeholder is simply dropped.
fn replace_note(value: &Value, note_id: &str, server: &Value) -> Value {
  edit_notes(value, |notes| {
    if notes.iter().any(|n| id_of(n) == id_of(server)) {
      notes.retain(|n| id_of(n) != Some(note_id));
    } else if let Some(slot) = notes.iter_mut().find(|n| id_of(n) == Some(note_id)) {
      *slot = server.clone();
    }
  })
}

pub(crate) fn create_mutation(board_id: &str, temp: &Note) -> Mutation {
  let temp_id = temp.id.clone();
  let placeholder = serde_json::to_value(temp).unwrap_or_else(|_| json!({ "id": temp_id }));

  Mutation::new(ResourceKey::notes(board_id), move |v| push_note(v, &placeholder)).on_settle(
    move |cached, response| match note_from_response(response) {
      Ok(note) => match serde_json::to_value(&note) {
        Ok(server) => replace_note(cached, &temp_id, &server),
        Err(_) => remove_note(cached, &temp_id),
      },
      // The refresh that follows brings the note in.
      Err(_) => remove_note(cached, &temp_id),
    },
  )
}

pub(crate) fn remove_mutation(board_id: &str, note_id: &str) -> Mutation {
  let note_id = note_id.to_string();
  Mutation::new(ResourceKey::notes(board_id), move |v| remove_note(v, &note_id))
}

pub(crate) fn color_mutation(board_id: &str, note_id: &str, color: &str) -> Mutation {
  let note_id = note_id.to_string();
  let color = color.to_string();
  Mutation::new(ResourceKey::notes(board_id), move |v| {
    edit_note(v, &note_id, |note| note.color = Some(color.clone()))
  })
}

/// Sets `checked` rather than flipping it, so replaying the patch on newer
/// server data gives the same result.
pub(crate) fn item_checked_mutation(
  board_id: &str,
  note_id: &str,
  item_id: &str,
  checked: bool,
) -> Mutation {
  let note_id = note_id.to_string();
  let item_id = item_id.to_string();
  Mutation::new(ResourceKey::notes(board_id), move |v| {
    edit_note(v, &note_id, |note| {
      if let Some(item) = note.checklist_items.iter_mut().find(|i| i.id == item_id) {
        item.checked = checked;
      }
    })
  })
}

pub(crate) fn add_item_mutation(board_id: &str, note_id: &str, item: ChecklistItem) -> Mutation {
  let note_id = note_id.to_string();
  Mutation::new(ResourceKey::notes(board_id), move |v| {
    edit_note(v, &note_id, |note| {
      if note.item(&item.id).is_none() {
        note.checklist_items.push(item.clone());
      }
    })
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::testing::{modified, test_url, ScriptedFetcher};
  use crate::sync::{FetchError, PollConfig};
  use std::time::Duration;

  fn note(id: &str) -> Value {
    json!({
      "id": id,
      "color": "#fef3c7",
      "boardId": "b1",
      "archivedAt": null,
      "createdAt": "2025-01-02T03:04:05.000Z",
      "updatedAt": "2025-01-02T03:04:05.000Z",
      "checklistItems": [
        {"id": format!("{id}-i1"), "content": "first", "checked": false, "order": 0}
      ]
    })
  }

  fn ids(value: &Value) -> Vec<String> {
    value["notes"]
      .as_array()
      .unwrap()
      .iter()
      .map(|n| n["id"].as_str().unwrap().to_string())
      .collect()
  }

  async fn primed(notes: Value) -> SyncCoordinator<ScriptedFetcher> {
    let fetcher = ScriptedFetcher::new();
    fetcher.push(modified(notes, "\"v1\""));
    let sync = SyncCoordinator::new(fetcher, PollConfig::default());
    sync
      .load(&ResourceKey::notes("b1"), &test_url())
      .await
      .unwrap();
    sync
  }

  fn cached(sync: &SyncCoordinator<ScriptedFetcher>) -> Value {
    sync.cache().get(&ResourceKey::notes("b1")).unwrap()
  }

  #[test]
  fn test_temp_ids() {
    let a = temp_id();
    let b = temp_id();
    assert!(a.starts_with("temp-"));
    assert_eq!(a.len(), "temp-".len() + 16);
    assert_ne!(a, b);

    let note = temp_note("b1", "Buy milk", Some("#fff"));
    assert!(note.is_pending());
    assert_eq!(note.checklist_items[0].content, "Buy milk");
  }

  #[tokio::test]
  async fn test_create_replaces_temp_note_with_server_note() {
    let sync = primed(json!({"notes": [note("n1")]})).await;
    let temp = temp_note("b1", "Buy milk", None);
    let temp_id = temp.id.clone();

    let response = sync
      .mutate(create_mutation("b1", &temp), || async {
        Ok(json!({"note": note("n2")}))
      })
      .await
      .unwrap();

    assert_eq!(response["note"]["id"], "n2");
    let value = cached(&sync);
    assert_eq!(ids(&value), vec!["n1", "n2"]);
    assert!(!ids(&value).contains(&temp_id));
  }

  #[tokio::test(start_paused = true)]
  async fn test_create_then_poll_brings_canonical_note() {
    let fetcher = ScriptedFetcher::new();
    fetcher.push(modified(json!({"notes": [note("n1")]}), "\"v1\""));
    let sync = SyncCoordinator::new(fetcher.clone(), PollConfig::default());
    let mut updates = sync.watch(ResourceKey::notes("b1"), test_url(), Duration::from_secs(4));
    updates.recv().await.unwrap();

    let mut created = note("note-42");
    created["checklistItems"][0]["content"] = json!("Buy milk");
    // The board as the next poll sees it: the server touched the note again.
    let mut canonical = created.clone();
    canonical["updatedAt"] = json!("2025-01-02T03:04:06.500Z");
    canonical["checklistItems"][0]["order"] = json!(10);
    fetcher.push(modified(json!({"notes": [note("n1"), canonical.clone()]}), "\"v2\""));

    let temp = temp_note("b1", "Buy milk", None);
    let temp_id = temp.id.clone();
    sync
      .mutate(create_mutation("b1", &temp), move || async move {
        Ok(json!({ "note": created }))
      })
      .await
      .unwrap();

    let settled = cached(&sync);
    assert_eq!(ids(&settled), vec!["n1", "note-42"]);
    assert!(!ids(&settled).contains(&temp_id));

    let update = updates.recv().await.unwrap();
    assert_eq!(update.payload["notes"][1], canonical);
    let payload: NotesPayload = serde_json::from_value(update.payload).unwrap();
    assert_eq!(payload.notes[1].id, "note-42");
    assert_eq!(payload.notes[1].checklist_items[0].order, 10);
    assert_eq!(cached(&sync)["notes"][1], canonical);
    assert!(!sync.cache().meta(&ResourceKey::notes("b1")).unwrap().stale);
  }

  #[tokio::test]
  async fn test_create_shows_placeholder_until_settled() {
    let sync = primed(json!({"notes": []})).await;
    let temp = temp_note("b1", "Buy milk", None);
    let temp_id = temp.id.clone();
    let (tx, rx) = tokio::sync::oneshot::channel::<Result<Value, FetchError>>();

    let pending = sync.mutate(create_mutation("b1", &temp), || async move {
      rx.await.unwrap()
    });
    tokio::pin!(pending);

    // Poll once so the optimistic write lands.
    tokio::select! {
      biased;
      _ = &mut pending => panic!("request should still be in flight"),
      _ = tokio::task::yield_now() => {}
    }
    assert_eq!(ids(&cached(&sync)), vec![temp_id.clone()]);
    assert_eq!(cached(&sync)["notes"][0]["checklistItems"][0]["content"], "Buy milk");

    tx.send(Ok(json!({"note": note("n9")}))).unwrap();
    pending.await.unwrap();
    assert_eq!(ids(&cached(&sync)), vec!["n9"]);
  }

  #[tokio::test]
  async fn test_create_failure_removes_placeholder() {
    let sync = primed(json!({"notes": [note("n1")]})).await;
    let before = cached(&sync);
    let temp = temp_note("b1", "Buy milk", None);

    let err = sync
      .mutate(create_mutation("b1", &temp), || async {
        Err(FetchError::Http {
          status: 403,
          message: Some("Not a member of this board".into()),
        })
      })
      .await
      .unwrap_err();

    assert_eq!(err.user_message(), "Not a member of this board");
    assert_eq!(cached(&sync), before);
  }

  #[tokio::test]
  async fn test_archive_failure_restores_original_position() {
    let sync = primed(json!({"notes": [note("n1"), note("n2"), note("n3")]})).await;
    let before = cached(&sync);

    let result = sync
      .mutate(remove_mutation("b1", "n2"), || async {
        Err(FetchError::Network("connection reset".into()))
      })
      .await;

    assert!(result.is_err());
    assert_eq!(ids(&cached(&sync)), vec!["n1", "n2", "n3"]);
    assert_eq!(cached(&sync), before);
  }

  #[tokio::test]
  async fn test_archive_success_keeps_note_removed() {
    let sync = primed(json!({"notes": [note("n1"), note("n2")]})).await;

    sync
      .mutate(remove_mutation("b1", "n1"), || async {
        Ok(json!({"note": note("n1")}))
      })
      .await
      .unwrap();

    assert_eq!(ids(&cached(&sync)), vec!["n2"]);
    assert!(sync.cache().meta(&ResourceKey::notes("b1")).unwrap().stale);
  }

  #[tokio::test]
  async fn test_color_edit_touches_only_one_note() {
    let sync = primed(json!({"notes": [note("n1"), note("n2")], "cursor": null})).await;
    let before = cached(&sync);

    sync
      .mutate(color_mutation("b1", "n2", "#dbeafe"), || async { Ok(Value::Null) })
      .await
      .unwrap();

    let after = cached(&sync);
    assert_eq!(after["notes"][0], before["notes"][0]);
    assert_eq!(after["notes"][1]["color"], "#dbeafe");
    assert_eq!(after["notes"][1]["createdAt"], before["notes"][1]["createdAt"]);
    assert_eq!(after["cursor"], Value::Null);
  }

  #[tokio::test]
  async fn test_item_checked_is_idempotent() {
    let sync = primed(json!({"notes": [note("n1")]})).await;
    let mutation = item_checked_mutation("b1", "n1", "n1-i1", true);

    sync
      .mutate(mutation.clone(), || async { Ok(Value::Null) })
      .await
      .unwrap();
    sync
      .mutate(mutation, || async { Ok(Value::Null) })
      .await
      .unwrap();

    assert_eq!(cached(&sync)["notes"][0]["checklistItems"][0]["checked"], true);
  }

  #[tokio::test]
  async fn test_add_item_appends_once() {
    let sync = primed(json!({"notes": [note("n1")]})).await;
    let item = ChecklistItem {
      id: "temp-item".into(),
      content: "second".into(),
      checked: false,
      order: 1,
      extra: Map::new(),
    };

    sync
      .mutate(add_item_mutation("b1", "n1", item), || async { Ok(Value::Null) })
      .await
      .unwrap();

    let items = cached(&sync)["notes"][0]["checklistItems"].clone();
    assert_eq!(items.as_array().unwrap().len(), 2);
    assert_eq!(items[1]["content"], "second");
  }

  #[test]
  fn test_edits_on_unexpected_payloads_are_no_ops() {
    let value = json!({"boards": []});
    assert_eq!(remove_note(&value, "n1"), value);
    assert_eq!(push_note(&value, &note("n1")), value);

    let undecodable = json!({"notes": [{"id": "n1", "checklistItems": "oops"}]});
    assert_eq!(
      edit_note(&undecodable, "n1", |n| n.color = Some("#000".into())),
      undecodable
    );
  }

  #[test]
  fn test_replace_note_when_server_note_already_present() {
    let value = json!({"notes": [note("n2"), note("temp-1")]});
    let replaced = replace_note(&value, "temp-1", &note("n2"));
    assert_eq!(ids(&replaced), vec!["n2"]);
  }
}
