use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::warn;
use url::Url;

use crate::config::Config;
use crate::sync::{FetchError, HttpFetcher, ResourceKey, ResourceKind};

use super::types::{CreateNote, Note, NoteEnvelope};

/// Gumboard API client wrapper
#[derive(Clone)]
pub struct GumboardClient {
  base: Url,
  http: HttpFetcher,
}

impl GumboardClient {
  pub fn new(config: &Config) -> Result<Self> {
    // Public boards can be read without a session.
    let token = match Config::get_session_token() {
      Ok(token) => Some(token),
      Err(e) => {
        warn!("{}", e);
        None
      }
    };
    let session = token
      .as_deref()
      .map(|t| (config.api.session_cookie.as_str(), t));
    let http = HttpFetcher::new(session)?;
    Self::with_fetcher(&config.api.url, http)
  }

  pub fn with_fetcher(base_url: &str, http: HttpFetcher) -> Result<Self> {
    let base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid Gumboard URL {}: {}", base_url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Invalid Gumboard URL {}: not a base URL", base_url));
    }
    Ok(Self { base, http })
  }

  /// The fetcher handed to the polling engine.
  pub fn fetcher(&self) -> HttpFetcher {
    self.http.clone()
  }

  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    // Checked in `with_fetcher`, so this always has segments.
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  pub fn boards_url(&self) -> Url {
    self.endpoint(&["api", "boards"])
  }

  pub fn notes_url(&self, board_id: &str) -> Url {
    self.endpoint(&["api", "boards", board_id, "notes"])
  }

  pub fn note_url(&self, board_id: &str, note_id: &str) -> Url {
    self.endpoint(&["api", "boards", board_id, "notes", note_id])
  }

  /// URL polled for a cache key.
  pub fn resource_url(&self, key: &ResourceKey) -> Url {
    let mut url = match key.kind {
      ResourceKind::Notes => self.notes_url(&key.id),
      ResourceKind::Boards => self.boards_url(),
    };
    if let Some(page) = key.page {
      url.query_pairs_mut().append_pair("page", &page.to_string());
    }
    url
  }

  /// `POST /api/boards/{id}/notes`
  pub async fn create_note(&self, board_id: &str, body: &CreateNote) -> Result<Value, FetchError> {
    let body = serde_json::to_value(body)?;
    self
      .http
      .send_json(Method::POST, &self.notes_url(board_id), Some(&body))
      .await
  }

  /// `PUT /api/boards/{id}/notes/{noteId}` with a partial note.
  pub async fn update_note(
    &self,
    board_id: &str,
    note_id: &str,
    changes: &Value,
  ) -> Result<Value, FetchError> {
    self
      .http
      .send_json(Method::PUT, &self.note_url(board_id, note_id), Some(changes))
      .await
  }

  pub async fn archive_note(
    &self,
    board_id: &str,
    note_id: &str,
    archived_at: &str,
  ) -> Result<Value, FetchError> {
    self
      .update_note(board_id, note_id, &json!({ "archivedAt": archived_at }))
      .await
  }

  /// `DELETE /api/boards/{id}/notes/{noteId}`
  pub async fn delete_note(&self, board_id: &str, note_id: &str) -> Result<Value, FetchError> {
    self
      .http
      .send_json(Method::DELETE, &self.note_url(board_id, note_id), None)
      .await
  }
}

/// Pull the note out of a `{ "note": ... }` write response.
pub fn note_from_response(response: &Value) -> Result<Note, FetchError> {
  let envelope: NoteEnvelope = serde_json::from_value(response.clone())?;
  Ok(envelope.note)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base: &str) -> GumboardClient {
    GumboardClient::with_fetcher(base, HttpFetcher::new(None).unwrap()).unwrap()
  }

  #[test]
  fn test_urls() {
    let c = client("https://gumboard.example.com");
    assert_eq!(
      c.boards_url().as_str(),
      "https://gumboard.example.com/api/boards"
    );
    assert_eq!(
      c.notes_url("b1").as_str(),
      "https://gumboard.example.com/api/boards/b1/notes"
    );
    assert_eq!(
      c.note_url("b1", "n 2").as_str(),
      "https://gumboard.example.com/api/boards/b1/notes/n%202"
    );
  }

  #[test]
  fn test_urls_under_subpath() {
    let c = client("https://example.com/gumboard");
    assert_eq!(
      c.notes_url("b1").as_str(),
      "https://example.com/gumboard/api/boards/b1/notes"
    );
  }

  #[test]
  fn test_resource_url_with_page() {
    let c = client("http://localhost:3000/");
    let key = ResourceKey {
      page: Some(2),
      ..ResourceKey::notes("b1")
    };
    assert_eq!(
      c.resource_url(&key).as_str(),
      "http://localhost:3000/api/boards/b1/notes?page=2"
    );
    assert_eq!(
      c.resource_url(&ResourceKey::boards()).as_str(),
      "http://localhost:3000/api/boards"
    );
  }

  #[test]
  fn test_invalid_base_url() {
    let result = GumboardClient::with_fetcher("not a url", HttpFetcher::new(None).unwrap());
    assert!(result.is_err());
  }

  #[test]
  fn test_note_from_response() {
    let note = note_from_response(&json!({"note": {"id": "n1", "checklistItems": []}})).unwrap();
    assert_eq!(note.id, "n1");

    let err = note_from_response(&json!({"ok": true})).unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
  }
}
