//! In-memory query cache with optimistic patches.
//!
//! Every change to an entry goes through one of four paths: a server result
//! ([`QueryCache::apply_server`]), an optimistic write ([`QueryCache::apply_patch`]),
//! or the settle of such a write ([`QueryCache::commit_patch`] /
//! [`QueryCache::rollback_patch`]). Each write bumps the entry `version`, which
//! is what consumers compare to detect a change.
//!
//! Two counters matter for reconciliation:
//! - `version` increases on every write. A poll response is only applied when
//!   the version it was issued against is still current.
//! - `generation` increases only when server data replaces the base value.
//!   A patch snapshot is only valid within the generation it was taken in.
//!
//! The displayed value is always the entry's base (server data plus writes
//! the server has acknowledged) with the remaining patches replayed on top.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::error::MutationError;
use super::fingerprint::Fingerprint;
use super::key::ResourceKey;

/// Optimistic forward transform over a cached payload.
pub type Transform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Settle transform: `(cached value, server response) -> new value`.
pub type SettleTransform = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Correlation id of an optimistic patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchId(u64);

/// Change notifications for UI bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  Updated { key: ResourceKey, version: u64 },
  Invalidated { key: ResourceKey },
}

/// What happened to a poll result handed to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerApply {
  /// The displayed value changed.
  Changed { value: Value, version: u64 },
  /// Same content as before; only sync bookkeeping was touched.
  Unchanged,
  /// The entry was written after the request was issued, so the response may
  /// predate that write. The entry is left stale for the next tick.
  Discarded,
}

/// How a failed patch was undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
  /// The pre-patch value was restored.
  Restored,
  /// Server data replaced the entry since the patch, so the snapshot is out
  /// of date. The value was rebuilt from the server base without the patch
  /// and the entry invalidated.
  Invalidated,
  /// The patch was not found (already settled or the entry was removed).
  Missing,
}

/// Sync state of an entry, for status lines.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMeta {
  pub synced_at: Option<DateTime<Utc>>,
  pub stale: bool,
  /// Optimistic writes still waiting on the server
  pub pending: usize,
}

struct PendingPatch {
  id: PatchId,
  /// Replayed when a patch beneath this one is rolled back.
  forward: Transform,
  /// Value right before this patch was applied.
  snapshot: Value,
  generation: u64,
  committed: bool,
}

struct CacheEntry {
  value: Value,
  /// Last server value with acknowledged writes folded in.
  base: Value,
  version: u64,
  generation: u64,
  fingerprint: Option<Fingerprint>,
  etag: Option<String>,
  synced_at: Option<DateTime<Utc>>,
  stale: bool,
  patches: Vec<PendingPatch>,
}

impl CacheEntry {
  fn meta(&self) -> EntryMeta {
    EntryMeta {
      synced_at: self.synced_at,
      stale: self.stale,
      pending: self.patches.iter().filter(|p| !p.committed).count(),
    }
  }

  fn position(&self, id: PatchId) -> Option<usize> {
    self.patches.iter().position(|p| p.id == id)
  }

  /// Fold committed patches that no longer have a pending patch beneath them
  /// into the base.
  fn prune_committed(&mut self) {
    let settled = self.patches.iter().take_while(|p| p.committed).count();
    for patch in self.patches.drain(..settled) {
      self.base = (patch.forward)(&self.base);
    }
  }

  /// Recompute the displayed value from the base and the remaining patches.
  fn rebuild(&mut self) -> Value {
    let mut value = self.base.clone();
    for patch in self.patches.iter_mut() {
      patch.snapshot = value.clone();
      value = (patch.forward)(&value);
    }
    value
  }
}

#[derive(Default)]
struct Entries {
  map: HashMap<ResourceKey, CacheEntry>,
  next_version: u64,
}

impl Entries {
  fn bump(&mut self) -> u64 {
    self.next_version += 1;
    self.next_version
  }
}

/// Shared cache of server payloads keyed by [`ResourceKey`].
///
/// Intended to be owned by a single coordinator and passed around as an
/// `Arc`. The lock is only held for map reads and writes, never across I/O.
pub struct QueryCache {
  entries: Mutex<Entries>,
  next_patch: AtomicU64,
  events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
  pub fn new() -> Self {
    let (events, _rx) = broadcast::channel(64);
    Self {
      entries: Mutex::new(Entries::default()),
      next_patch: AtomicU64::new(1),
      events,
    }
  }

  fn lock(&self) -> MutexGuard<'_, Entries> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, event: CacheEvent) {
    // No subscribers is fine.
    let _ = self.events.send(event);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  pub fn get(&self, key: &ResourceKey) -> Option<Value> {
    self.lock().map.get(key).map(|e| e.value.clone())
  }

  /// Typed read. Returns `None` when missing or when the payload does not
  /// match `T`.
  pub fn get_as<T: DeserializeOwned>(&self, key: &ResourceKey) -> Option<T> {
    let value = self.get(key)?;
    match serde_json::from_value(value) {
      Ok(typed) => Some(typed),
      Err(e) => {
        warn!(%key, error = %e, "cached payload does not match the requested type");
        None
      }
    }
  }

  pub fn meta(&self, key: &ResourceKey) -> Option<EntryMeta> {
    self.lock().map.get(key).map(CacheEntry::meta)
  }

  /// Current version of the entry, `0` when there is none.
  pub fn version(&self, key: &ResourceKey) -> u64 {
    self.lock().map.get(key).map(|e| e.version).unwrap_or(0)
  }

  pub fn keys(&self) -> Vec<ResourceKey> {
    self.lock().map.keys().cloned().collect()
  }

  /// ETag to send with the next poll. Stale or missing entries get none so
  /// that the server returns a full body.
  pub fn conditional_etag(&self, key: &ResourceKey) -> Option<String> {
    let entries = self.lock();
    let entry = entries.map.get(key)?;
    if entry.stale {
      None
    } else {
      entry.etag.clone()
    }
  }

  pub fn remove(&self, key: &ResourceKey) -> bool {
    self.lock().map.remove(key).is_some()
  }

  /// Mark an entry stale: the next successful poll replaces it even when its
  /// fingerprint matches. Calling it twice is the same as calling it once.
  pub fn invalidate(&self, key: &ResourceKey) {
    let changed = {
      let mut entries = self.lock();
      match entries.map.get_mut(key) {
        Some(entry) if !entry.stale => {
          entry.stale = true;
          true
        }
        _ => false,
      }
    };
    if changed {
      debug!(%key, "invalidated");
      self.emit(CacheEvent::Invalidated { key: key.clone() });
    }
  }

  /// Reconcile a 200 response from the server.
  ///
  /// `issued_version` is the entry version observed when the request was
  /// sent. Pending optimistic patches are re-applied on top of the new server
  /// value so that in-flight edits stay visible.
  pub fn apply_server(
    &self,
    key: &ResourceKey,
    body: Value,
    fingerprint: Fingerprint,
    etag: Option<String>,
    issued_version: u64,
  ) -> ServerApply {
    let outcome = {
      let mut guard = self.lock();
      let entries = &mut *guard;
      let current_version = entries.map.get(key).map(|e| e.version).unwrap_or(0);

      if current_version != issued_version {
        if let Some(entry) = entries.map.get_mut(key) {
          entry.stale = true;
        }
        return ServerApply::Discarded;
      }

      let now = Utc::now();
      let next_version = entries.next_version + 1;
      let outcome = match entries.map.entry(key.clone()) {
        Entry::Vacant(slot) => {
          slot.insert(CacheEntry {
            value: body.clone(),
            base: body.clone(),
            version: next_version,
            generation: 1,
            fingerprint: Some(fingerprint),
            etag,
            synced_at: Some(now),
            stale: false,
            patches: Vec::new(),
          });
          ServerApply::Changed {
            value: body,
            version: next_version,
          }
        }
        Entry::Occupied(mut slot) => {
          let entry = slot.get_mut();
          if !entry.stale && entry.fingerprint.as_ref() == Some(&fingerprint) {
            entry.synced_at = Some(now);
            if etag.is_some() {
              entry.etag = etag;
            }
            ServerApply::Unchanged
          } else {
            let mut value = body.clone();
            for patch in entry.patches.iter().filter(|p| !p.committed) {
              value = (patch.forward)(&value);
            }
            entry.base = body;
            entry.generation += 1;
            entry.fingerprint = Some(fingerprint);
            entry.etag = etag;
            entry.synced_at = Some(now);
            entry.stale = false;
            // Committed patches are already part of the server value.
            entry.patches.retain(|p| !p.committed);

            if entry.value == value {
              ServerApply::Unchanged
            } else {
              entry.value = value.clone();
              entry.version = next_version;
              ServerApply::Changed {
                value,
                version: next_version,
              }
            }
          }
        }
      };

      if let ServerApply::Changed { version, .. } = &outcome {
        entries.next_version = *version;
      }
      outcome
    };

    if let ServerApply::Changed { version, .. } = &outcome {
      self.emit(CacheEvent::Updated {
        key: key.clone(),
        version: *version,
      });
    }
    outcome
  }

  /// Apply an optimistic write and remember how to undo it.
  pub fn apply_patch(
    &self,
    key: &ResourceKey,
    forward: Transform,
  ) -> Result<PatchId, MutationError> {
    let id = PatchId(self.next_patch.fetch_add(1, Ordering::Relaxed));
    let version = {
      let mut guard = self.lock();
      let entries = &mut *guard;
      let version = entries.bump();
      let entry = entries
        .map
        .get_mut(key)
        .ok_or_else(|| MutationError::NotCached(key.clone()))?;

      let snapshot = entry.value.clone();
      entry.value = forward(&snapshot);
      entry.version = version;
      entry.patches.push(PendingPatch {
        id,
        forward,
        snapshot,
        generation: entry.generation,
        committed: false,
      });
      version
    };

    debug!(%key, patch = id.0, version, "optimistic write applied");
    self.emit(CacheEvent::Updated {
      key: key.clone(),
      version,
    });
    Ok(id)
  }

  /// Settle a patch whose request succeeded.
  ///
  /// With a `settle` transform the server `response` is folded into the
  /// displayed value and into the snapshots of patches applied after this one,
  /// so no later rollback can bring back the optimistic placeholder. The entry
  /// is invalidated either way so the next poll brings canonical state.
  pub fn commit_patch(
    &self,
    key: &ResourceKey,
    id: PatchId,
    response: Option<&Value>,
    settle: Option<&SettleTransform>,
  ) {
    let updated = {
      let mut guard = self.lock();
      let entries = &mut *guard;
      let next_version = entries.next_version + 1;
      let Some(entry) = entries.map.get_mut(key) else {
        return;
      };
      let Some(index) = entry.position(id) else {
        return;
      };

      let mut updated = None;
      if let (Some(response), Some(settle)) = (response, settle) {
        let settled = settle(&entry.value, response);
        if settled != entry.value {
          entry.value = settled;
          entry.version = next_version;
          updated = Some(next_version);
        }
        for later in entry.patches.iter_mut().skip(index + 1) {
          later.snapshot = settle(&later.snapshot, response);
        }

        let forward = Arc::clone(&entry.patches[index].forward);
        let settle = Arc::clone(settle);
        let response = response.clone();
        entry.patches[index].forward = Arc::new(move |v: &Value| settle(&forward(v), &response));
      }

      entry.patches[index].committed = true;
      entry.prune_committed();
      entry.stale = true;

      if let Some(version) = updated {
        entries.next_version = version;
      }
      updated
    };

    debug!(%key, patch = id.0, "optimistic write committed");
    if let Some(version) = updated {
      self.emit(CacheEvent::Updated {
        key: key.clone(),
        version,
      });
    }
    self.emit(CacheEvent::Invalidated { key: key.clone() });
  }

  /// Undo a patch whose request failed.
  ///
  /// Patches applied after it are undone in reverse order (by restoring this
  /// patch's snapshot) and then replayed, so their optimistic effect survives.
  /// If server data replaced the entry in the meantime the snapshot is
  /// meaningless: the value is rebuilt from the server base and the remaining
  /// patches, and the entry is invalidated.
  pub fn rollback_patch(&self, key: &ResourceKey, id: PatchId) -> RollbackOutcome {
    let (outcome, version) = {
      let mut guard = self.lock();
      let entries = &mut *guard;
      let next_version = entries.next_version + 1;
      let Some(entry) = entries.map.get_mut(key) else {
        return RollbackOutcome::Missing;
      };
      let Some(index) = entry.position(id) else {
        return RollbackOutcome::Missing;
      };

      let patch = entry.patches.remove(index);
      let (outcome, value) = if patch.generation != entry.generation {
        entry.stale = true;
        entry.prune_committed();
        (RollbackOutcome::Invalidated, entry.rebuild())
      } else {
        let mut value = patch.snapshot;
        for later in entry.patches.iter_mut().skip(index) {
          later.snapshot = value.clone();
          value = (later.forward)(&value);
        }
        entry.prune_committed();
        (RollbackOutcome::Restored, value)
      };

      if value == entry.value {
        (outcome, None)
      } else {
        entry.value = value;
        entry.version = next_version;
        entries.next_version = next_version;
        (outcome, Some(next_version))
      }
    };

    if let Some(version) = version {
      debug!(%key, patch = id.0, version, ?outcome, "optimistic write rolled back");
      self.emit(CacheEvent::Updated {
        key: key.clone(),
        version,
      });
    }
    if outcome == RollbackOutcome::Invalidated {
      debug!(%key, patch = id.0, "snapshot outdated, invalidated");
      self.emit(CacheEvent::Invalidated { key: key.clone() });
    }
    outcome
  }
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::fingerprint::fingerprint;
  use serde_json::json;

  fn key() -> ResourceKey {
    ResourceKey::notes("b1")
  }

  fn seed(cache: &QueryCache, value: Value) -> u64 {
    let fp = fingerprint(&value);
    let version = cache.version(&key());
    cache.apply_server(&key(), value, fp, Some("\"v1\"".into()), version);
    cache.version(&key())
  }

  fn server(cache: &QueryCache, value: Value) -> ServerApply {
    let fp = fingerprint(&value);
    let version = cache.version(&key());
    cache.apply_server(&key(), value, fp, None, version)
  }

  fn push(item: &'static str) -> Transform {
    Arc::new(move |v: &Value| {
      let mut v = v.clone();
      if let Some(items) = v["items"].as_array_mut() {
        items.push(json!(item));
      }
      v
    })
  }

  #[test]
  fn test_first_server_result_creates_entry() {
    let cache = QueryCache::new();
    let result = server(&cache, json!({"items": []}));
    assert!(matches!(result, ServerApply::Changed { .. }));
    assert_eq!(cache.get(&key()), Some(json!({"items": []})));

    let meta = cache.meta(&key()).unwrap();
    assert!(!meta.stale);
    assert!(meta.synced_at.is_some());
    assert_eq!(meta.pending, 0);
  }

  #[test]
  fn test_same_fingerprint_is_unchanged() {
    let cache = QueryCache::new();
    let version = seed(&cache, json!({"items": ["a"]}));
    assert_eq!(server(&cache, json!({"items": ["a"]})), ServerApply::Unchanged);
    assert_eq!(cache.version(&key()), version);
  }

  #[test]
  fn test_invalidate_forces_replacement_and_is_idempotent() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": ["a"]}));
    let mut events = cache.subscribe();

    cache.invalidate(&key());
    cache.invalidate(&key());
    assert!(cache.meta(&key()).unwrap().stale);
    assert_eq!(cache.conditional_etag(&key()), None);
    assert_eq!(
      events.try_recv().unwrap(),
      CacheEvent::Invalidated { key: key() }
    );
    assert!(events.try_recv().is_err());

    // Same payload, but the stale flag makes the server copy authoritative.
    assert_eq!(server(&cache, json!({"items": ["a"]})), ServerApply::Unchanged);
    assert!(!cache.meta(&key()).unwrap().stale);
    assert_eq!(cache.conditional_etag(&key()), None);
  }

  #[test]
  fn test_response_issued_before_write_is_discarded() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": []}));
    let issued = cache.version(&key());

    let patch = cache.apply_patch(&key(), push("x")).unwrap();
    let body = json!({"items": ["server"]});
    let fp = fingerprint(&body);
    assert_eq!(
      cache.apply_server(&key(), body, fp, None, issued),
      ServerApply::Discarded
    );
    assert!(cache.meta(&key()).unwrap().stale);

    // The failed mutation still restores the exact pre-mutation value.
    assert_eq!(cache.rollback_patch(&key(), patch), RollbackOutcome::Restored);
    assert_eq!(cache.get(&key()), Some(json!({"items": []})));
  }

  #[test]
  fn test_patch_on_missing_entry_fails() {
    let cache = QueryCache::new();
    let err = cache.apply_patch(&key(), push("x")).unwrap_err();
    assert_eq!(err, MutationError::NotCached(key()));
  }

  #[test]
  fn test_rollback_restores_snapshot_exactly() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": ["a", "b"], "meta": {"z": 1, "a": 2}}));
    let before = cache.get(&key()).unwrap();

    let patch = cache.apply_patch(&key(), push("c")).unwrap();
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["a", "b", "c"]));

    assert_eq!(cache.rollback_patch(&key(), patch), RollbackOutcome::Restored);
    assert_eq!(cache.get(&key()).unwrap(), before);
    assert_eq!(cache.meta(&key()).unwrap().pending, 0);
  }

  #[test]
  fn test_rollback_of_earlier_patch_replays_later_ones() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": []}));

    let first = cache.apply_patch(&key(), push("first")).unwrap();
    let second = cache.apply_patch(&key(), push("second")).unwrap();
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["first", "second"]));

    assert_eq!(cache.rollback_patch(&key(), first), RollbackOutcome::Restored);
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["second"]));

    assert_eq!(cache.rollback_patch(&key(), second), RollbackOutcome::Restored);
    assert_eq!(cache.get(&key()).unwrap(), json!({"items": []}));
  }

  #[test]
  fn test_rollback_after_server_refresh_invalidates() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": []}));

    let patch = cache.apply_patch(&key(), push("mine")).unwrap();
    // Another session changed the board; the poll lands while we're pending.
    let result = server(&cache, json!({"items": ["theirs"]}));
    assert!(matches!(result, ServerApply::Changed { .. }));
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["theirs", "mine"]));

    assert_eq!(cache.rollback_patch(&key(), patch), RollbackOutcome::Invalidated);
    assert!(cache.meta(&key()).unwrap().stale);
    // The failed edit is gone right away, not at the next poll.
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["theirs"]));

    // Next poll is authoritative.
    server(&cache, json!({"items": ["theirs"]}));
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["theirs"]));
  }

  #[test]
  fn test_failed_patch_leaves_no_trace_after_server_refresh() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": []}));

    let first = cache.apply_patch(&key(), push("a")).unwrap();
    let second = cache.apply_patch(&key(), push("b")).unwrap();
    cache.commit_patch(&key(), first, None, None);

    // The refresh after the first write confirms it while the second is out.
    server(&cache, json!({"items": ["a"]}));
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["a", "b"]));

    let mut events = cache.subscribe();
    assert_eq!(cache.rollback_patch(&key(), second), RollbackOutcome::Invalidated);
    assert_eq!(cache.get(&key()), Some(json!({"items": ["a"]})));
    assert!(cache.meta(&key()).unwrap().stale);
    assert!(matches!(events.try_recv().unwrap(), CacheEvent::Updated { .. }));
    assert_eq!(
      events.try_recv().unwrap(),
      CacheEvent::Invalidated { key: key() }
    );
  }

  #[test]
  fn test_rollback_after_refresh_keeps_other_pending_edits() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": []}));

    let first = cache.apply_patch(&key(), push("first")).unwrap();
    cache.apply_patch(&key(), push("second")).unwrap();
    server(&cache, json!({"items": ["theirs"]}));

    assert_eq!(cache.rollback_patch(&key(), first), RollbackOutcome::Invalidated);
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["theirs", "second"]));
    assert_eq!(cache.meta(&key()).unwrap().pending, 1);
  }

  #[test]
  fn test_keys_and_remove() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": []}));
    let boards = json!({"boards": []});
    let fp = fingerprint(&boards);
    cache.apply_server(&ResourceKey::boards(), boards, fp, None, 0);

    let keys = cache.keys();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&key()));

    assert!(cache.remove(&key()));
    assert!(!cache.remove(&key()));
    assert_eq!(cache.keys(), vec![ResourceKey::boards()]);
    assert_eq!(cache.get(&key()), None);
  }

  #[test]
  fn test_commit_with_settle_rewrites_later_snapshots() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": []}));

    let create = cache.apply_patch(&key(), push("temp-1")).unwrap();
    let other = cache.apply_patch(&key(), push("other")).unwrap();

    let settle: SettleTransform = Arc::new(|cached: &Value, response: &Value| {
      let mut v = cached.clone();
      if let Some(items) = v["items"].as_array_mut() {
        for item in items.iter_mut() {
          if item == "temp-1" {
            *item = response["id"].clone();
          }
        }
      }
      v
    });
    cache.commit_patch(&key(), create, Some(&json!({"id": "real-1"})), Some(&settle));
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["real-1", "other"]));
    assert!(cache.meta(&key()).unwrap().stale);

    // Rolling back the later patch must not resurrect the temp id.
    assert_eq!(cache.rollback_patch(&key(), other), RollbackOutcome::Restored);
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["real-1"]));
    assert_eq!(cache.meta(&key()).unwrap().pending, 0);
  }

  #[test]
  fn test_committed_patch_is_replayed_when_earlier_patch_fails() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": []}));

    let first = cache.apply_patch(&key(), push("first")).unwrap();
    let second = cache.apply_patch(&key(), push("second")).unwrap();
    cache.commit_patch(&key(), second, None, None);

    assert_eq!(cache.rollback_patch(&key(), first), RollbackOutcome::Restored);
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["second"]));
  }

  #[test]
  fn test_server_result_keeps_pending_edits_visible() {
    let cache = QueryCache::new();
    seed(&cache, json!({"items": ["a"]}));
    cache.apply_patch(&key(), push("pending")).unwrap();

    server(&cache, json!({"items": ["a", "b"]}));
    assert_eq!(cache.get(&key()).unwrap()["items"], json!(["a", "b", "pending"]));
    assert_eq!(cache.meta(&key()).unwrap().pending, 1);
  }

  #[test]
  fn test_get_as_typed() {
    #[derive(serde::Deserialize, PartialEq, Debug)]
    struct Items {
      items: Vec<String>,
    }

    let cache = QueryCache::new();
    seed(&cache, json!({"items": ["a"]}));
    assert_eq!(
      cache.get_as::<Items>(&key()),
      Some(Items {
        items: vec!["a".into()]
      })
    );
    assert_eq!(cache.get_as::<Vec<u8>>(&key()), None);
  }
}
