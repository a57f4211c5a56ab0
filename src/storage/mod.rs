//! Durable per-origin key/value storage.
//!
//! Holds the handful of values that must survive a restart: the token pair,
//! the active role and the theme preference. Two backends exist: SQLite in
//! the user data directory, and a process-local map used when the database
//! cannot be opened.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use color_eyre::Result;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const ACTIVE_ROLE_KEY: &str = "activeRole";
pub const THEME_MODE_KEY: &str = "themeMode";

/// Keys removed on logout. The theme preference is deliberately absent.
pub const SESSION_KEYS: &[&str] = &[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, ACTIVE_ROLE_KEY];

/// Trait for durable storage backends.
pub trait DurableStorage: Send + Sync {
  /// Read a value.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Write a value, replacing any previous one.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove a value. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  /// Opaque marker that changes when another process modified the storage.
  fn change_marker(&self) -> Result<i64>;
}
