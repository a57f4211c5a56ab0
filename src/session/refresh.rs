//! Single-flight access token refresh.

use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use super::{SessionEvent, TokenStore};

/// Tokens issued by the login and refresh endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
  pub access_token: String,
  /// Absent when the backend does not rotate refresh tokens
  #[serde(default)]
  pub refresh_token: Option<String>,
}

/// The backend wraps token payloads in `{ "data": ... }`; accept both shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenEnvelope {
  Wrapped { data: TokenPair },
  Bare(TokenPair),
}

impl TokenPair {
  pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
    Ok(match serde_json::from_value(value)? {
      TokenEnvelope::Wrapped { data } => data,
      TokenEnvelope::Bare(pair) => pair,
    })
  }
}

#[derive(Debug, Error)]
enum RefreshError {
  #[error("no refresh token")]
  MissingRefreshToken,
  #[error("refresh rejected with {0}")]
  Rejected(StatusCode),
  #[error("refresh request failed: {0}")]
  Network(#[from] reqwest::Error),
  #[error("malformed refresh response: {0}")]
  Decode(#[from] serde_json::Error),
}

type Waiter = oneshot::Sender<Option<String>>;

/// Ensures at most one refresh call is in flight.
///
/// The first caller performs the network call; callers arriving while it is
/// running are parked on a oneshot channel and receive the same outcome.
pub struct RefreshCoordinator {
  http: reqwest::Client,
  refresh_url: Url,
  tokens: Arc<TokenStore>,
  /// `Some` while a refresh is running, holding the parked callers
  inflight: Mutex<Option<Vec<Waiter>>>,
}

impl RefreshCoordinator {
  pub fn new(http: reqwest::Client, refresh_url: Url, tokens: Arc<TokenStore>) -> Self {
    Self {
      http,
      refresh_url,
      tokens,
      inflight: Mutex::new(None),
    }
  }

  /// Obtain a new access token, or `None` if the session is over.
  pub async fn refresh(&self) -> Option<String> {
    let parked = {
      let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
      match inflight.as_mut() {
        Some(waiters) => {
          let (tx, rx) = oneshot::channel();
          waiters.push(tx);
          Some(rx)
        }
        None => {
          *inflight = Some(Vec::new());
          None
        }
      }
    };

    if let Some(rx) = parked {
      debug!("Refresh already in progress, waiting for it");
      // A dropped sender means the leader was abandoned
      return rx.await.ok().flatten();
    }

    let guard = InflightGuard {
      coordinator: self,
      settled: false,
    };
    let result = match self.perform().await {
      Ok(token) => Some(token),
      Err(e) => {
        warn!(error = %e, "Token refresh failed, ending session");
        self.tokens.clear();
        self.tokens.notify(SessionEvent::Expired);
        None
      }
    };
    guard.settle(result.clone());
    result
  }

  async fn perform(&self) -> Result<String, RefreshError> {
    let held = self.tokens.refresh_token();

    // Another instance may have rotated the pair already; reusing its tokens
    // avoids presenting a refresh token the backend has retired.
    self.tokens.reload_from_storage();
    let current = self.tokens.session();
    if let (Some(access), Some(stored)) = (&current.access_token, &current.refresh_token) {
      if held.as_ref().is_some_and(|h| h != stored) {
        info!("Adopting tokens rotated by another instance");
        return Ok(access.clone());
      }
    }

    let refresh_token = current
      .refresh_token
      .ok_or(RefreshError::MissingRefreshToken)?;

    let response = self
      .http
      .post(self.refresh_url.clone())
      .header("Accept", "application/json")
      .json(&serde_json::json!({ "refresh_token": refresh_token }))
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(RefreshError::Rejected(status));
    }

    let body: serde_json::Value = response.json().await?;
    let pair = TokenPair::from_json(body)?;
    let next_refresh = pair.refresh_token.unwrap_or(refresh_token);
    self.tokens.set_tokens(&pair.access_token, &next_refresh);
    self.tokens.notify(SessionEvent::TokensChanged);
    info!("Access token refreshed");

    Ok(pair.access_token)
  }

  fn settle(&self, result: Option<String>) {
    let waiters = self
      .inflight
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
      .unwrap_or_default();
    for waiter in waiters {
      // Waiter may have given up
      let _ = waiter.send(result.clone());
    }
  }
}

/// Releases parked callers even when the leading future is dropped mid-call.
struct InflightGuard<'a> {
  coordinator: &'a RefreshCoordinator,
  settled: bool,
}

impl InflightGuard<'_> {
  fn settle(mut self, result: Option<String>) {
    self.settled = true;
    self.coordinator.settle(result);
  }
}

impl Drop for InflightGuard<'_> {
  fn drop(&mut self) {
    if !self.settled {
      self.coordinator.settle(None);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::{DurableStorage, MemoryStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
  use futures::future::join_all;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn coordinator(server: &MockServer, tokens: Arc<TokenStore>) -> RefreshCoordinator {
    let url = Url::parse(&format!("{}/api/auth/refresh", server.uri())).unwrap();
    RefreshCoordinator::new(reqwest::Client::new(), url, tokens)
  }

  fn signed_in() -> (Arc<MemoryStorage>, Arc<TokenStore>) {
    let storage = Arc::new(MemoryStorage::new());
    let tokens = Arc::new(TokenStore::new(storage.clone()));
    tokens.set_tokens("old-access", "old-refresh");
    (storage, tokens)
  }

  #[test]
  fn test_token_pair_accepts_both_shapes() {
    let wrapped = TokenPair::from_json(json!({"data": {"access_token": "a", "refresh_token": "r"}}));
    assert_eq!(
      wrapped.unwrap(),
      TokenPair {
        access_token: "a".into(),
        refresh_token: Some("r".into())
      }
    );
    let bare = TokenPair::from_json(json!({"access_token": "a"})).unwrap();
    assert_eq!(bare.refresh_token, None);
  }

  #[tokio::test]
  async fn test_concurrent_refreshes_share_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .and(body_json(json!({"refresh_token": "old-refresh"})))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({"data": {"access_token": "new-access", "refresh_token": "new-refresh"}}))
          .set_delay(Duration::from_millis(100)),
      )
      .expect(1)
      .mount(&server)
      .await;

    let (storage, tokens) = signed_in();
    let coordinator = coordinator(&server, tokens.clone());

    let results = join_all((0..8).map(|_| coordinator.refresh())).await;

    assert!(results.iter().all(|r| r.as_deref() == Some("new-access")));
    assert_eq!(tokens.refresh_token().as_deref(), Some("new-refresh"));
    assert_eq!(
      storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
      Some("new-access")
    );
  }

  #[tokio::test]
  async fn test_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!({"data": {"access_token": "new-access"}})),
      )
      .mount(&server)
      .await;

    let (_, tokens) = signed_in();
    let coordinator = coordinator(&server, tokens.clone());

    assert_eq!(coordinator.refresh().await.as_deref(), Some("new-access"));
    assert_eq!(tokens.refresh_token().as_deref(), Some("old-refresh"));
  }

  #[tokio::test]
  async fn test_rejected_refresh_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
      .expect(1)
      .mount(&server)
      .await;

    let (storage, tokens) = signed_in();
    let mut events = tokens.subscribe();
    let coordinator = coordinator(&server, tokens.clone());

    let results = join_all((0..4).map(|_| coordinator.refresh())).await;

    assert!(results.iter().all(Option::is_none));
    assert!(!tokens.is_authenticated());
    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
  }

  #[tokio::test]
  async fn test_missing_refresh_token_skips_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
    tokens.set_access_token(Some("orphan"));
    let coordinator = coordinator(&server, tokens.clone());

    assert_eq!(coordinator.refresh().await, None);
    assert!(!tokens.is_authenticated());
  }

  #[tokio::test]
  async fn test_network_failure_ends_session() {
    let (_, tokens) = signed_in();
    // Nothing listens on this port
    let url = Url::parse("http://127.0.0.1:9/api/auth/refresh").unwrap();
    let coordinator = RefreshCoordinator::new(reqwest::Client::new(), url, tokens.clone());

    assert_eq!(coordinator.refresh().await, None);
    assert!(!tokens.is_authenticated());
  }

  #[tokio::test]
  async fn test_adopts_pair_rotated_elsewhere() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let (storage, tokens) = signed_in();
    // Another instance refreshed and wrote its pair
    storage.set(ACCESS_TOKEN_KEY, "their-access").unwrap();
    storage.set(REFRESH_TOKEN_KEY, "their-refresh").unwrap();
    let coordinator = coordinator(&server, tokens.clone());

    assert_eq!(coordinator.refresh().await.as_deref(), Some("their-access"));
    assert_eq!(tokens.refresh_token().as_deref(), Some("their-refresh"));
  }

  #[tokio::test]
  async fn test_abandoned_leader_releases_waiters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
      .mount(&server)
      .await;

    let (_, tokens) = signed_in();
    let coordinator = Arc::new(coordinator(&server, tokens));

    let leader = {
      let coordinator = coordinator.clone();
      tokio::spawn(async move { coordinator.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let waiter = {
      let coordinator = coordinator.clone();
      tokio::spawn(async move { coordinator.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    leader.abort();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(result, None);
  }
}
