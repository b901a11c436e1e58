//! Conditional fetch client.
//!
//! Wraps an HTTP GET with ETag-aware conditional requests and reports the
//! outcome as a value instead of raising: `Modified` with a body, `NotModified`
//! for a 304, or a typed [`FetchError`]. It never touches the cache.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, COOKIE, ETAG, IF_NONE_MATCH, PRAGMA};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use tracing::debug;
use url::Url;

use super::error::FetchError;

/// Result of a successful conditional GET.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
  /// 200 with a fresh body
  Modified { body: Value, etag: Option<String> },
  /// 304; the copy we hold is still current
  NotModified,
}

/// Something that can perform a conditional GET for a resource URL.
///
/// Cancellation is by dropping the returned future.
pub trait ResourceFetcher: Send + Sync + 'static {
  fn fetch(
    &self,
    url: &Url,
    etag: Option<&str>,
  ) -> impl Future<Output = std::result::Result<FetchOutcome, FetchError>> + Send;
}

/// `{ "error": "..." }` body returned by the board API on failures.
#[derive(Debug, Deserialize)]
struct ErrorBody {
  error: String,
}

/// reqwest-backed fetcher used against a real deployment.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  /// Create a fetcher. When `session` is given as `(cookie name, token)`, the
  /// cookie is attached to every request.
  pub fn new(session: Option<(&str, &str)>) -> Result<Self> {
    let mut headers = HeaderMap::new();
    if let Some((name, token)) = session {
      let cookie = HeaderValue::from_str(&format!("{}={}", name, token))
        .map_err(|e| eyre!("Invalid session cookie: {}", e))?;
      headers.insert(COOKIE, cookie);
    }

    let client = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }

  /// Send a JSON write (`POST`/`PUT`/`PATCH`/`DELETE`) and return the decoded
  /// response body. An empty 2xx body decodes to `Value::Null`.
  pub async fn send_json(
    &self,
    method: Method,
    url: &Url,
    body: Option<&Value>,
  ) -> std::result::Result<Value, FetchError> {
    let mut request = self.client.request(method.clone(), url.clone());
    if let Some(body) = body {
      request = request
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(body)?);
    }

    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;
    debug!(%method, %url, status = status.as_u16(), "write request settled");

    if !status.is_success() {
      return Err(http_error(status, &bytes));
    }
    if bytes.iter().all(u8::is_ascii_whitespace) {
      return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
  }
}

impl ResourceFetcher for HttpFetcher {
  async fn fetch(
    &self,
    url: &Url,
    etag: Option<&str>,
  ) -> std::result::Result<FetchOutcome, FetchError> {
    let mut request = self
      .client
      .get(url.clone())
      .header(CACHE_CONTROL, "no-cache")
      .header(PRAGMA, "no-cache");
    if let Some(etag) = etag {
      request = request.header(IF_NONE_MATCH, etag);
    }

    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::NOT_MODIFIED {
      return Ok(FetchOutcome::NotModified);
    }

    let etag = response
      .headers()
      .get(ETAG)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let bytes = response.bytes().await?;

    if !status.is_success() {
      return Err(http_error(status, &bytes));
    }

    let body = serde_json::from_slice(&bytes)?;
    Ok(FetchOutcome::Modified { body, etag })
  }
}

fn http_error(status: StatusCode, body: &[u8]) -> FetchError {
  let message = serde_json::from_slice::<ErrorBody>(body)
    .ok()
    .map(|b| b.error);
  FetchError::Http {
    status: status.as_u16(),
    message,
  }
}
