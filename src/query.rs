//! Fetch state a view can poll from its tick.
//!
//! A [`Query`] wraps a fetcher closure. Each fetch runs on its own task and
//! reports back through a oneshot channel. A superseded fetch is left to
//! finish (it may be leading a token refresh); only its receiver is dropped,
//! so the result is ignored. The last successful value stays readable while a
//! refetch is running, so lists do not blank out on refresh.
//!
//! ```ignore
//! let api = api.clone();
//! let mut tickets = Query::new(move || {
//!   let api = api.clone();
//!   async move { api.tickets(false).await.map_err(|e| e.to_string()) }
//! });
//! tickets.fetch();
//!
//! // every tick
//! if tickets.poll() {
//!   // settled: tickets.state() is Success or Error
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub enum QueryState<T> {
  Idle,
  Loading,
  Success(T),
  /// Failed; holds a message fit for the footer
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    if let QueryState::Success(data) = self {
      Some(data)
    } else {
      None
    }
  }

  pub fn error(&self) -> Option<&str> {
    if let QueryState::Error(message) = self {
      Some(message)
    } else {
      None
    }
  }
}

type Fetch<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

pub struct Query<T> {
  state: QueryState<T>,
  /// Last good value, kept while a refetch or after a failed one
  previous: Option<T>,
  fetcher: Box<dyn Fn() -> Fetch<T> + Send + Sync>,
  /// Receiver of the running fetch; dropping it orphans the task, never aborts it
  in_flight: Option<oneshot::Receiver<Result<T, String>>>,
}

impl<T> Query<T> {
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// The current value, or the last good one while loading or after an error.
  pub fn data(&self) -> Option<&T> {
    self.state.data().or(self.previous.as_ref())
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }
}

impl<T: Clone + Send + 'static> Query<T> {
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      previous: None,
      fetcher: Box::new(move || Box::pin(fetcher())),
      in_flight: None,
    }
  }

  /// Swap in a fresher value, e.g. one read back from the cache.
  ///
  /// Ignored while a fetch is in flight; its result wins.
  pub fn set_data(&mut self, data: T) {
    if self.in_flight.is_none() {
      self.previous = Some(data.clone());
      self.state = QueryState::Success(data);
    }
  }

  /// Start a fetch unless one is already running.
  pub fn fetch(&mut self) {
    if self.in_flight.is_none() {
      self.start();
    }
  }

  /// Start a fetch; a running one completes in the background, unobserved.
  pub fn refetch(&mut self) {
    self.in_flight = None;
    self.start();
  }

  /// Collect the result of the running fetch, if it has settled.
  ///
  /// Returns `true` when the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(result) = &mut self.in_flight else {
      return false;
    };

    let outcome = match result.try_recv() {
      Ok(outcome) => outcome,
      Err(oneshot::error::TryRecvError::Empty) => return false,
      Err(oneshot::error::TryRecvError::Closed) => Err("Request was cancelled".to_string()),
    };
    self.in_flight = None;

    self.state = match outcome {
      Ok(data) => {
        self.previous = Some(data.clone());
        QueryState::Success(data)
      }
      Err(message) => QueryState::Error(message),
    };
    true
  }

  fn start(&mut self) {
    let (tx, rx) = oneshot::channel();
    let fetch = (self.fetcher)();
    tokio::spawn(async move {
      // The receiver is gone when the query was dropped or restarted
      let _ = tx.send(fetch.await);
    });

    self.state = QueryState::Loading;
    self.in_flight = Some(rx);
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("in_flight", &self.in_flight.is_some())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  async fn settle<T: Clone + Send + 'static>(query: &mut Query<T>) {
    tokio::time::timeout(Duration::from_secs(1), async {
      while !query.poll() {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .unwrap();
  }

  #[tokio::test]
  async fn test_fetch_then_poll() {
    let mut query = Query::new(|| async { Ok::<_, String>(vec![1, 2, 3]) });
    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.is_loading());
    settle(&mut query).await;

    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
    assert!(!query.poll());
  }

  #[tokio::test]
  async fn test_error_keeps_previous_value() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut query = Query::new(move || {
      let n = counter.fetch_add(1, Ordering::SeqCst);
      async move {
        if n == 0 {
          Ok(5)
        } else {
          Err("backend down".to_string())
        }
      }
    });

    query.fetch();
    settle(&mut query).await;
    query.refetch();
    assert!(query.is_loading());
    assert_eq!(query.data(), Some(&5));

    settle(&mut query).await;
    assert_eq!(query.error(), Some("backend down"));
    assert_eq!(query.data(), Some(&5));
  }

  #[tokio::test]
  async fn test_second_fetch_while_loading_is_ignored() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut query = Query::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, String>(1)
      }
    });

    query.fetch();
    query.fetch();
    settle(&mut query).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_refetch_supersedes_running_fetch() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut query = Query::new(move || {
      let n = counter.fetch_add(1, Ordering::SeqCst);
      async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok::<_, String>(n)
      }
    });

    query.fetch();
    query.refetch();
    settle(&mut query).await;
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_set_data_loses_to_inflight_fetch() {
    let mut query = Query::new(|| async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok::<_, String>(1)
    });

    query.set_data(7);
    assert_eq!(query.data(), Some(&7));

    query.fetch();
    query.set_data(9);
    settle(&mut query).await;
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_refetch_lets_a_running_refresh_finish() {
    use crate::session::{ApiClient, ApiRequest, TokenStore, EXPIRY_HEADER};
    use crate::storage::{DurableStorage, MemoryStorage, REFRESH_TOKEN_KEY};
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/tickets"))
      .and(header("Authorization", "Bearer old-access"))
      .respond_with(ResponseTemplate::new(401).insert_header(EXPIRY_HEADER, "true"))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/tickets"))
      .and(header("Authorization", "Bearer new-access"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;
    // The backend retires a refresh token once it has been used
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({"data": {"access_token": "new-access", "refresh_token": "new-refresh"}}))
          .set_delay(Duration::from_millis(300)),
      )
      .up_to_n_times(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(ResponseTemplate::new(401))
      .mount(&server)
      .await;

    let storage = Arc::new(MemoryStorage::new());
    let tokens = Arc::new(TokenStore::new(storage.clone()));
    tokens.set_tokens("old-access", "old-refresh");
    let client = ApiClient::new(Url::parse(&server.uri()).unwrap(), tokens.clone(), None).unwrap();

    let mut query = Query::new(move || {
      let client = client.clone();
      async move {
        let response = client
          .request(&ApiRequest::get("/api/tickets"))
          .await
          .map_err(|e| e.to_string())?;
        Ok::<_, String>(response.status().as_u16())
      }
    });
    query.fetch();
    tokio::time::sleep(Duration::from_millis(100)).await;
    query.refetch();
    settle(&mut query).await;

    assert_eq!(query.data(), Some(&200));
    assert!(tokens.is_authenticated());
    assert_eq!(
      storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
      Some("new-refresh")
    );
    let refresh_calls = server
      .received_requests()
      .await
      .unwrap()
      .into_iter()
      .filter(|r| r.url.path() == "/api/auth/refresh")
      .count();
    assert_eq!(refresh_calls, 1);
  }

  #[tokio::test]
  async fn test_state_is_readable_from_generic_code() {
    fn busy<T>(query: &Query<T>) -> bool {
      query.is_loading() && query.data().is_none() && query.error().is_none()
    }

    let mut query = Query::new(|| async {
      tokio::time::sleep(Duration::from_secs(5)).await;
      Ok::<_, String>(1)
    });
    assert!(!busy(&query));
    query.fetch();
    assert!(busy(&query));
  }
}
