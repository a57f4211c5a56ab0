//! SQLite-backed durable storage.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use url::Url;

use super::DurableStorage;
use crate::db::Database;

/// Durable storage in a shared SQLite file, scoped to one backend origin.
pub struct SqliteStorage {
  db: Mutex<Database>,
  origin: String,
}

impl SqliteStorage {
  /// Open the storage file at `path` for the backend at `base_url`.
  pub fn open(path: &Path, base_url: &Url) -> Result<Self> {
    let db = Database::open(path)?;
    Ok(Self {
      db: Mutex::new(db),
      origin: origin_of(base_url),
    })
  }
}

/// Scheme, host and port of a URL, e.g. `https://desk.example.com:8443`.
pub fn origin_of(url: &Url) -> String {
  url.origin().ascii_serialization()
}

impl DurableStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let db = self.db.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    db.conn()
      .query_row(
        "SELECT value FROM kv_store WHERE origin = ? AND key = ?",
        params![self.origin, key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let db = self.db.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    db.conn()
      .execute(
        "INSERT OR REPLACE INTO kv_store (origin, key, value, updated_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![self.origin, key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let db = self.db.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    db.conn()
      .execute(
        "DELETE FROM kv_store WHERE origin = ? AND key = ?",
        params![self.origin, key],
      )
      .map_err(|e| eyre!("Failed to remove {}: {}", key, e))?;

    Ok(())
  }

  fn change_marker(&self) -> Result<i64> {
    let db = self.db.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    db.data_version()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base() -> Url {
    Url::parse("https://desk.example.com/api").unwrap()
  }

  #[test]
  fn test_origin_strips_path() {
    assert_eq!(origin_of(&base()), "https://desk.example.com");
    let with_port = Url::parse("http://localhost:8080/").unwrap();
    assert_eq!(origin_of(&with_port), "http://localhost:8080");
  }

  #[test]
  fn test_set_get_remove() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open(&dir.path().join("storage.db"), &base()).unwrap();

    assert_eq!(storage.get("access_token").unwrap(), None);
    storage.set("access_token", "abc").unwrap();
    assert_eq!(storage.get("access_token").unwrap().as_deref(), Some("abc"));
    storage.set("access_token", "def").unwrap();
    assert_eq!(storage.get("access_token").unwrap().as_deref(), Some("def"));
    storage.remove("access_token").unwrap();
    assert_eq!(storage.get("access_token").unwrap(), None);
    // Removing twice is fine
    storage.remove("access_token").unwrap();
  }

  #[test]
  fn test_values_are_scoped_by_origin() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.db");
    let a = SqliteStorage::open(&path, &base()).unwrap();
    let b = SqliteStorage::open(&path, &Url::parse("http://localhost:3000").unwrap()).unwrap();

    a.set("access_token", "for-a").unwrap();
    assert_eq!(b.get("access_token").unwrap(), None);
  }

  #[test]
  fn test_change_marker_tracks_other_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.db");
    let ours = SqliteStorage::open(&path, &base()).unwrap();
    let theirs = SqliteStorage::open(&path, &base()).unwrap();

    let before = ours.change_marker().unwrap();
    ours.set("themeMode", "dark").unwrap();
    assert_eq!(ours.change_marker().unwrap(), before);

    theirs.set("access_token", "rotated").unwrap();
    assert_ne!(ours.change_marker().unwrap(), before);
    assert_eq!(ours.get("access_token").unwrap().as_deref(), Some("rotated"));
  }
}
