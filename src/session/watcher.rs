use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::TokenStore;

/// Background task that notices token changes made by other instances.
///
/// Polls the storage change marker and reloads the token pair when it moves.
/// The task stops when the watcher is dropped.
pub struct StorageWatcher {
  handle: JoinHandle<()>,
}

impl StorageWatcher {
  pub fn spawn(tokens: Arc<TokenStore>, interval: Duration) -> Self {
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

      let mut last_marker = tokens.storage().change_marker().ok();
      loop {
        ticker.tick().await;
        match tokens.storage().change_marker() {
          Ok(marker) if Some(marker) != last_marker => {
            last_marker = Some(marker);
            tokens.reload_from_storage();
          }
          Ok(_) => {}
          Err(e) => debug!(error = %e, "Failed to poll storage"),
        }
      }
    });

    Self { handle }
  }
}

impl Drop for StorageWatcher {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::SessionEvent;
  use crate::storage::{DurableStorage, SqliteStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
  use url::Url;

  #[tokio::test]
  async fn test_logout_in_other_instance_is_observed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.db");
    let base = Url::parse("http://localhost:8080").unwrap();

    let ours = Arc::new(SqliteStorage::open(&path, &base).unwrap());
    let theirs = SqliteStorage::open(&path, &base).unwrap();
    theirs.set(ACCESS_TOKEN_KEY, "a1").unwrap();
    theirs.set(REFRESH_TOKEN_KEY, "r1").unwrap();

    let tokens = Arc::new(TokenStore::new(ours));
    assert!(tokens.is_authenticated());
    let mut events = tokens.subscribe();
    let _watcher = StorageWatcher::spawn(tokens.clone(), Duration::from_millis(10));

    // Give the watcher its baseline before the other instance writes
    tokio::time::sleep(Duration::from_millis(30)).await;
    theirs.remove(ACCESS_TOKEN_KEY).unwrap();
    theirs.remove(REFRESH_TOKEN_KEY).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(event, SessionEvent::SignedOut);
    assert!(!tokens.is_authenticated());
  }
}
