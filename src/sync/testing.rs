//! Test doubles for the sync core.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use super::error::FetchError;
use super::fetch::{FetchOutcome, ResourceFetcher};

/// One recorded request.
#[derive(Debug, Clone)]
pub struct FetchCall {
  pub url: Url,
  pub etag: Option<String>,
  pub at: Instant,
}

struct Step {
  delay: Duration,
  result: Result<FetchOutcome, FetchError>,
}

#[derive(Default)]
struct Script {
  steps: VecDeque<Step>,
  fallback: Option<Result<FetchOutcome, FetchError>>,
  calls: Vec<FetchCall>,
}

/// Fetcher that replays queued outcomes and records every call.
///
/// When the queue is empty it answers with the fallback (304 by default).
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
  script: Arc<Mutex<Script>>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, result: Result<FetchOutcome, FetchError>) {
    self.push_delayed(Duration::ZERO, result);
  }

  pub fn push_delayed(&self, delay: Duration, result: Result<FetchOutcome, FetchError>) {
    self.script.lock().unwrap().steps.push_back(Step { delay, result });
  }

  pub fn set_fallback(&self, result: Result<FetchOutcome, FetchError>) {
    self.script.lock().unwrap().fallback = Some(result);
  }

  pub fn calls(&self) -> Vec<FetchCall> {
    self.script.lock().unwrap().calls.clone()
  }

  pub fn call_count(&self) -> usize {
    self.script.lock().unwrap().calls.len()
  }
}

impl ResourceFetcher for ScriptedFetcher {
  fn fetch(
    &self,
    url: &Url,
    etag: Option<&str>,
  ) -> impl Future<Output = Result<FetchOutcome, FetchError>> + Send {
    let step = {
      let mut script = self.script.lock().unwrap();
      script.calls.push(FetchCall {
        url: url.clone(),
        etag: etag.map(String::from),
        at: Instant::now(),
      });
      script.steps.pop_front().unwrap_or_else(|| Step {
        delay: Duration::ZERO,
        result: script
          .fallback
          .clone()
          .unwrap_or(Ok(FetchOutcome::NotModified)),
      })
    };

    async move {
      if !step.delay.is_zero() {
        tokio::time::sleep(step.delay).await;
      }
      step.result
    }
  }
}

pub fn modified(body: serde_json::Value, etag: &str) -> Result<FetchOutcome, FetchError> {
  Ok(FetchOutcome::Modified {
    body,
    etag: Some(etag.to_string()),
  })
}

pub fn not_modified() -> Result<FetchOutcome, FetchError> {
  Ok(FetchOutcome::NotModified)
}

pub fn test_url() -> Url {
  Url::parse("http://gumboard.test/api/boards/b1/notes").unwrap()
}
