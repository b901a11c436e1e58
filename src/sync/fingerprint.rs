//! Deterministic payload fingerprints.
//!
//! A fingerprint is the hex SHA-256 of a canonical JSON rendering in which
//! object keys are sorted at every level. Two payloads that differ only in key
//! order share a fingerprint; any change in a value changes it.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Short prefix for log lines.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

pub fn fingerprint(value: &Value) -> Fingerprint {
  let mut hasher = Sha256::new();
  write_canonical(value, &mut hasher);
  Fingerprint(hex::encode(hasher.finalize()))
}

fn write_canonical(value: &Value, hasher: &mut Sha256) {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      hasher.update(b"{");
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          hasher.update(b",");
        }
        write_canonical(&Value::String(key.clone()), hasher);
        hasher.update(b":");
        write_canonical(&map[key], hasher);
      }
      hasher.update(b"}");
    }
    Value::Array(items) => {
      hasher.update(b"[");
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          hasher.update(b",");
        }
        write_canonical(item, hasher);
      }
      hasher.update(b"]");
    }
    // Scalars have a single JSON rendering already.
    scalar => hasher.update(scalar.to_string().as_bytes()),
  }
}
