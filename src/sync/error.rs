//! Error types for the sync core.

use thiserror::Error;

use super::key::ResourceKey;

/// Why a request against the board API did not produce a usable response.
///
/// Polling treats every variant as "try again next tick". Mutations surface
/// them to the caller after the optimistic write has been reverted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  /// The request never reached the server, or was cut off on the way back.
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with something other than 2xx/304.
  #[error("server returned {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
  Http { status: u16, message: Option<String> },

  /// The body could not be parsed as JSON.
  #[error("malformed response body: {0}")]
  Decode(String),
}

impl FetchError {
  /// Network failures are retried silently; everything else is worth showing.
  pub fn is_transient(&self) -> bool {
    matches!(self, FetchError::Network(_))
  }

  /// Text suitable for a one-line notification.
  pub fn user_message(&self) -> String {
    match self {
      FetchError::Network(_) => "Could not reach the server".to_string(),
      FetchError::Http {
        message: Some(m), ..
      } => m.clone(),
      FetchError::Http { status, .. } => format!("Request failed ({status})"),
      FetchError::Decode(_) => "The server sent an unreadable response".to_string(),
    }
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      FetchError::Http { status, .. } => Some(*status),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      FetchError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
      FetchError::Http {
        status: status.as_u16(),
        message: None,
      }
    } else {
      FetchError::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for FetchError {
  fn from(err: serde_json::Error) -> Self {
    FetchError::Decode(err.to_string())
  }
}

/// Failure of an optimistic mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
  /// There is no cached value to patch. Load the resource first.
  #[error("{0} is not cached")]
  NotCached(ResourceKey),

  /// The request failed; the optimistic write has been undone.
  #[error(transparent)]
  Request(#[from] FetchError),
}

impl MutationError {
  pub fn user_message(&self) -> String {
    match self {
      MutationError::NotCached(key) => format!("{key} has not been loaded yet"),
      MutationError::Request(err) => err.user_message(),
    }
  }
}
