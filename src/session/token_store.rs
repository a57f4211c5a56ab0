use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{Session, SessionEvent};
use crate::storage::{DurableStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS};

/// Single point of truth for the token pair.
///
/// Reads are served from memory. Writes update memory and then durable
/// storage; a failed storage write is logged and the store keeps working
/// from memory for the rest of the process.
pub struct TokenStore {
  storage: Arc<dyn DurableStorage>,
  state: RwLock<Session>,
  degraded: AtomicBool,
  events: broadcast::Sender<SessionEvent>,
}

impl TokenStore {
  /// Create a store, loading any tokens already persisted.
  pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
    let read = |key: &str| match storage.get(key) {
      Ok(value) => value,
      Err(e) => {
        warn!(key, error = %e, "Failed to read persisted token");
        None
      }
    };
    let session = Session {
      access_token: read(ACCESS_TOKEN_KEY),
      refresh_token: read(REFRESH_TOKEN_KEY),
    };
    let (events, _) = broadcast::channel(16);

    Self {
      storage,
      state: RwLock::new(session),
      degraded: AtomicBool::new(false),
      events,
    }
  }

  pub fn session(&self) -> Session {
    self
      .state
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn access_token(&self) -> Option<String> {
    self
      .state
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .access_token
      .clone()
  }

  pub fn refresh_token(&self) -> Option<String> {
    self
      .state
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .refresh_token
      .clone()
  }

  pub fn is_authenticated(&self) -> bool {
    self
      .state
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .is_authenticated()
  }

  /// Whether a storage write failed and tokens now live in memory only.
  pub fn is_degraded(&self) -> bool {
    self.degraded.load(Ordering::Relaxed)
  }

  pub fn set_access_token(&self, token: Option<&str>) {
    self.persist(ACCESS_TOKEN_KEY, token);
    self.write_state(|s| s.access_token = token.map(String::from));
  }

  pub fn set_refresh_token(&self, token: Option<&str>) {
    self.persist(REFRESH_TOKEN_KEY, token);
    self.write_state(|s| s.refresh_token = token.map(String::from));
  }

  /// Store a freshly issued pair.
  pub fn set_tokens(&self, access_token: &str, refresh_token: &str) {
    self.set_access_token(Some(access_token));
    self.set_refresh_token(Some(refresh_token));
  }

  /// Drop both tokens.
  pub fn clear(&self) {
    self.set_access_token(None);
    self.set_refresh_token(None);
  }

  /// Drop every session-scoped key (tokens and role), leaving preferences.
  pub fn sign_out(&self) {
    for key in SESSION_KEYS {
      self.persist(key, None);
    }
    self.write_state(|s| *s = Session::default());
  }

  /// Pick up changes another instance made to durable storage.
  ///
  /// Returns the event that was broadcast, if the pair changed.
  pub fn reload_from_storage(&self) -> Option<SessionEvent> {
    // Storage no longer mirrors our state; trusting it would wipe live tokens
    if self.is_degraded() {
      return None;
    }

    let read = |key: &str| self.storage.get(key);
    let next = match (read(ACCESS_TOKEN_KEY), read(REFRESH_TOKEN_KEY)) {
      (Ok(access_token), Ok(refresh_token)) => Session {
        access_token,
        refresh_token,
      },
      (Err(e), _) | (_, Err(e)) => {
        warn!(error = %e, "Failed to reload tokens from storage");
        return None;
      }
    };

    let event = {
      let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
      if *state == next {
        return None;
      }
      let was_authenticated = state.is_authenticated();
      *state = next;
      match (was_authenticated, state.is_authenticated()) {
        (true, false) => SessionEvent::SignedOut,
        (false, true) => SessionEvent::SignedIn,
        _ => SessionEvent::TokensChanged,
      }
    };

    debug!(?event, "Tokens changed in another instance");
    self.notify(event);
    Some(event)
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
    self.events.subscribe()
  }

  pub fn notify(&self, event: SessionEvent) {
    // No subscribers is fine
    let _ = self.events.send(event);
  }

  pub fn storage(&self) -> &Arc<dyn DurableStorage> {
    &self.storage
  }

  fn write_state(&self, update: impl FnOnce(&mut Session)) {
    let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
    update(&mut state);
  }

  fn persist(&self, key: &str, value: Option<&str>) {
    let result = match value {
      Some(v) => self.storage.set(key, v),
      None => self.storage.remove(key),
    };
    if let Err(e) = result {
      warn!(key, error = %e, "Storage write failed, continuing in memory");
      self.degraded.store(true, Ordering::Relaxed);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::{MemoryStorage, ACTIVE_ROLE_KEY, THEME_MODE_KEY};
  use color_eyre::{eyre::eyre, Result};

  /// Reads succeed, writes always fail (think quota exceeded).
  struct ReadOnlyStorage;

  impl DurableStorage for ReadOnlyStorage {
    fn get(&self, _key: &str) -> Result<Option<String>> {
      Ok(None)
    }
    fn set(&self, _key: &str, _value: &str) -> Result<()> {
      Err(eyre!("quota exceeded"))
    }
    fn remove(&self, _key: &str) -> Result<()> {
      Err(eyre!("quota exceeded"))
    }
    fn change_marker(&self) -> Result<i64> {
      Ok(0)
    }
  }

  #[test]
  fn test_loads_persisted_tokens() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(ACCESS_TOKEN_KEY, "a1").unwrap();
    storage.set(REFRESH_TOKEN_KEY, "r1").unwrap();

    let store = TokenStore::new(storage);
    assert!(store.is_authenticated());
    assert_eq!(store.access_token().as_deref(), Some("a1"));
    assert_eq!(store.refresh_token().as_deref(), Some("r1"));
  }

  #[test]
  fn test_set_and_clear_persist() {
    let storage = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(storage.clone());

    store.set_tokens("a1", "r1");
    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a1"));
    assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));

    store.clear();
    assert!(!store.is_authenticated());
    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
  }

  #[test]
  fn test_sign_out_keeps_theme() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(ACTIVE_ROLE_KEY, "SUPPORT").unwrap();
    storage.set(THEME_MODE_KEY, "dark").unwrap();
    let store = TokenStore::new(storage.clone());
    store.set_tokens("a1", "r1");

    store.sign_out();

    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
    assert_eq!(storage.get(ACTIVE_ROLE_KEY).unwrap(), None);
    assert_eq!(storage.get(THEME_MODE_KEY).unwrap().as_deref(), Some("dark"));
    assert_eq!(store.session(), Session::default());
  }

  #[test]
  fn test_storage_failure_falls_back_to_memory() {
    let store = TokenStore::new(Arc::new(ReadOnlyStorage));

    store.set_tokens("a1", "r1");

    assert!(store.is_degraded());
    assert_eq!(store.access_token().as_deref(), Some("a1"));
    // Storage is empty but must not wipe the in-memory pair
    assert_eq!(store.reload_from_storage(), None);
    assert_eq!(store.refresh_token().as_deref(), Some("r1"));
  }

  #[test]
  fn test_reload_reports_external_changes() {
    let storage = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(storage.clone());
    let mut events = store.subscribe();

    assert_eq!(store.reload_from_storage(), None);

    storage.set(ACCESS_TOKEN_KEY, "a1").unwrap();
    storage.set(REFRESH_TOKEN_KEY, "r1").unwrap();
    assert_eq!(store.reload_from_storage(), Some(SessionEvent::SignedIn));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::SignedIn);

    storage.set(ACCESS_TOKEN_KEY, "a2").unwrap();
    assert_eq!(
      store.reload_from_storage(),
      Some(SessionEvent::TokensChanged)
    );
    assert_eq!(store.access_token().as_deref(), Some("a2"));

    storage.remove(ACCESS_TOKEN_KEY).unwrap();
    storage.remove(REFRESH_TOKEN_KEY).unwrap();
    assert_eq!(store.reload_from_storage(), Some(SessionEvent::SignedOut));
    assert!(!store.is_authenticated());
  }
}
