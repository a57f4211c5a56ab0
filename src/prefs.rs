//! Persisted user preferences: active role and theme.

use std::sync::Arc;
use tracing::warn;

use crate::roles::Role;
use crate::storage::{DurableStorage, ACTIVE_ROLE_KEY, THEME_MODE_KEY};
use crate::theme::ThemeMode;

#[derive(Clone)]
pub struct Preferences {
  storage: Arc<dyn DurableStorage>,
}

impl Preferences {
  pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
    Self { storage }
  }

  fn read(&self, key: &str) -> Option<String> {
    self.storage.get(key).unwrap_or_else(|e| {
      warn!(key, error = %e, "Failed to read preference");
      None
    })
  }

  fn write(&self, key: &str, value: &str) {
    if let Err(e) = self.storage.set(key, value) {
      warn!(key, error = %e, "Failed to save preference");
    }
  }

  pub fn active_role(&self) -> Option<Role> {
    self.read(ACTIVE_ROLE_KEY).map(|r| Role::from_wire(&r))
  }

  pub fn set_active_role(&self, role: Role) {
    self.write(ACTIVE_ROLE_KEY, role.wire_name());
  }

  pub fn theme(&self) -> ThemeMode {
    self
      .read(THEME_MODE_KEY)
      .and_then(|m| ThemeMode::parse(&m))
      .unwrap_or_default()
  }

  pub fn set_theme(&self, mode: ThemeMode) {
    self.write(THEME_MODE_KEY, mode.as_str());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStorage;

  #[test]
  fn test_preferences_roundtrip_through_storage() {
    let storage = Arc::new(MemoryStorage::new());
    let prefs = Preferences::new(storage.clone());
    assert_eq!(prefs.active_role(), None);
    assert_eq!(prefs.theme(), ThemeMode::Dark);

    prefs.set_active_role(Role::Support);
    prefs.set_theme(ThemeMode::Light);

    assert_eq!(storage.get(ACTIVE_ROLE_KEY).unwrap().as_deref(), Some("SUPPORT"));
    assert_eq!(storage.get(THEME_MODE_KEY).unwrap().as_deref(), Some("light"));
    assert_eq!(prefs.active_role(), Some(Role::Support));
    assert_eq!(prefs.theme(), ThemeMode::Light);
  }

  #[test]
  fn test_legacy_role_names_are_understood() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(ACTIVE_ROLE_KEY, "ADMIN").unwrap();
    assert_eq!(Preferences::new(storage).active_role(), Some(Role::Manager));
  }
}
