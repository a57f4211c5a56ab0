//! In-memory query cache scoped to one signed-in session.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::traits::QueryKey;

/// A cached query result, kept as raw JSON so snapshots restore exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
  pub value: Value,
  pub cached_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
  entries: HashMap<String, CachedEntry>,
  generation: u64,
}

/// Query results keyed by [`QueryKey`].
///
/// The generation counter moves on every [`QueryCache::reset`]; a fetch that
/// started under an older generation must not write its result.
#[derive(Default)]
pub struct QueryCache {
  inner: Mutex<Inner>,
}

impl QueryCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn generation(&self) -> u64 {
    self.lock().generation
  }

  pub fn get<K: QueryKey>(&self, key: &K) -> Option<CachedEntry> {
    self.lock().entries.get(&key.cache_hash()).cloned()
  }

  /// Typed view of a cached entry. Entries that no longer decode count as missing.
  pub fn get_as<K: QueryKey, T: DeserializeOwned>(&self, key: &K) -> Option<T> {
    let entry = self.get(key)?;
    match serde_json::from_value(entry.value) {
      Ok(data) => Some(data),
      Err(e) => {
        debug!(key = %key.description(), error = %e, "Cached entry failed to decode");
        None
      }
    }
  }

  pub fn set<K: QueryKey>(&self, key: &K, value: Value) {
    self.lock().entries.insert(
      key.cache_hash(),
      CachedEntry {
        value,
        cached_at: Utc::now(),
      },
    );
  }

  /// Write only if no reset happened since `generation` was read.
  pub fn set_if_current<K: QueryKey>(&self, key: &K, value: Value, generation: u64) -> bool {
    let mut inner = self.lock();
    if inner.generation != generation {
      debug!(key = %key.description(), "Discarding result from a previous session");
      return false;
    }
    inner.entries.insert(
      key.cache_hash(),
      CachedEntry {
        value,
        cached_at: Utc::now(),
      },
    );
    true
  }

  /// Modify a cached value in place. Returns false when nothing is cached.
  pub fn update<K: QueryKey>(&self, key: &K, f: impl FnOnce(&mut Value)) -> bool {
    match self.lock().entries.get_mut(&key.cache_hash()) {
      Some(entry) => {
        f(&mut entry.value);
        true
      }
      None => false,
    }
  }

  /// Put back an entry captured with [`QueryCache::get`]; `None` removes it.
  pub fn restore<K: QueryKey>(&self, key: &K, entry: Option<CachedEntry>) {
    let mut inner = self.lock();
    match entry {
      Some(entry) => {
        inner.entries.insert(key.cache_hash(), entry);
      }
      None => {
        inner.entries.remove(&key.cache_hash());
      }
    }
  }

  pub fn invalidate<K: QueryKey>(&self, key: &K) {
    self.lock().entries.remove(&key.cache_hash());
  }

  /// Drop everything and start a new generation.
  pub fn reset(&self) {
    let mut inner = self.lock();
    inner.entries.clear();
    inner.generation += 1;
    debug!(generation = inner.generation, "Query cache reset");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  struct Key(&'static str);

  impl QueryKey for Key {
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  #[test]
  fn test_update_and_restore() {
    let cache = QueryCache::new();
    let key = Key("tickets");
    assert!(!cache.update(&key, |_| {}));

    cache.set(&key, json!([{"id": 1, "statusId": 1}]));
    let before = cache.get(&key);

    assert!(cache.update(&key, |v| v[0]["statusId"] = json!(2)));
    assert_eq!(cache.get(&key).unwrap().value[0]["statusId"], 2);

    cache.restore(&key, before.clone());
    assert_eq!(cache.get(&key), before);

    cache.restore(&key, None);
    assert!(cache.get(&key).is_none());
  }

  #[test]
  fn test_reset_rejects_stale_writes() {
    let cache = QueryCache::new();
    let key = Key("me");
    let generation = cache.generation();

    cache.reset();

    assert!(!cache.set_if_current(&key, json!({"id": 1}), generation));
    assert!(cache.get(&key).is_none());
    assert!(cache.set_if_current(&key, json!({"id": 2}), cache.generation()));
  }

  #[test]
  fn test_get_as_ignores_undecodable_entries() {
    let cache = QueryCache::new();
    let key = Key("priorities");
    cache.set(&key, json!("not a list"));
    assert_eq!(cache.get_as::<_, Vec<i64>>(&key), None);
  }
}
