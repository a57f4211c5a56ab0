pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// Database connection wrapper for durable storage
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create the database at the given path
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    // Several desks may share the file
    conn
      .busy_timeout(Duration::from_millis(500))
      .map_err(|e| eyre!("Failed to set busy timeout: {}", e))?;
    conn
      .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to enable WAL: {}", e))?;

    let db = Self { conn };
    db.run_migrations()?;

    Ok(db)
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  /// Get a reference to the connection
  pub fn conn(&self) -> &Connection {
    &self.conn
  }

  /// SQLite's per-connection change counter.
  ///
  /// The value changes whenever another connection commits to the file; our
  /// own writes leave it untouched.
  pub fn data_version(&self) -> Result<i64> {
    self
      .conn
      .query_row("PRAGMA data_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read data_version: {}", e))
  }
}
