//! Authenticated request client.

use reqwest::{Method, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{RefreshCoordinator, TokenStore, REFRESH_PATH};
use crate::error::ApiResult;

/// Response header the backend sets when the bearer token has expired.
pub const EXPIRY_HEADER: &str = "X-Token-Expired";

/// Endpoints that never carry a bearer token.
const PUBLIC_PATHS: &[&str] = &[REFRESH_PATH, "/api/auth/login", "/api/auth/register"];

/// When to repeat a request.
///
/// An attempt is repeated only when the response carries the expiry header
/// and the attempt budget is not spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 2 }
  }
}

impl RetryPolicy {
  pub fn should_retry(&self, attempt: u32, response: &Response) -> bool {
    attempt < self.max_attempts && is_token_expired(response)
  }
}

fn is_token_expired(response: &Response) -> bool {
  response
    .headers()
    .get(EXPIRY_HEADER)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// A request description that can be sent more than once.
#[derive(Debug, Clone)]
pub struct ApiRequest {
  pub method: Method,
  pub path: String,
  pub query: Vec<(String, String)>,
  pub body: Option<serde_json::Value>,
}

impl ApiRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      query: Vec::new(),
      body: None,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::GET, path)
  }

  pub fn post(path: impl Into<String>) -> Self {
    Self::new(Method::POST, path)
  }

  pub fn patch(path: impl Into<String>) -> Self {
    Self::new(Method::PATCH, path)
  }

  pub fn json(mut self, body: serde_json::Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn query(mut self, key: &str, value: impl ToString) -> Self {
    self.query.push((key.to_string(), value.to_string()));
    self
  }
}

struct ClientInner {
  http: reqwest::Client,
  base_url: Url,
  public_urls: Vec<Url>,
  tokens: Arc<TokenStore>,
  refresher: RefreshCoordinator,
  policy: RetryPolicy,
}

/// HTTP client that attaches bearer tokens and recovers from expiry.
#[derive(Clone)]
pub struct ApiClient {
  inner: Arc<ClientInner>,
}

impl ApiClient {
  pub fn new(base_url: Url, tokens: Arc<TokenStore>, timeout: Option<Duration>) -> ApiResult<Self> {
    let mut builder = reqwest::Client::builder().cookie_store(true);
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let http = builder.build()?;

    let public_urls = PUBLIC_PATHS
      .iter()
      .map(|p| base_url.join(p))
      .collect::<Result<Vec<_>, _>>()?;
    let refresh_url = base_url.join(REFRESH_PATH)?;
    let refresher = RefreshCoordinator::new(http.clone(), refresh_url, tokens.clone());

    Ok(Self {
      inner: Arc::new(ClientInner {
        http,
        base_url,
        public_urls,
        tokens,
        refresher,
        policy: RetryPolicy::default(),
      }),
    })
  }

  pub fn tokens(&self) -> &Arc<TokenStore> {
    &self.inner.tokens
  }

  pub fn base_url(&self) -> &Url {
    &self.inner.base_url
  }

  /// Resolve a path against the base URL; absolute URLs pass through.
  pub fn resolve(&self, path: &str) -> ApiResult<Url> {
    if path.starts_with("http://") || path.starts_with("https://") {
      Ok(Url::parse(path)?)
    } else {
      Ok(self.inner.base_url.join(path)?)
    }
  }

  fn is_public(&self, url: &Url) -> bool {
    self
      .inner
      .public_urls
      .iter()
      .any(|p| p.as_str() == url.as_str())
  }

  /// Send a request, refreshing the access token and retrying once if the
  /// backend reports it expired.
  ///
  /// A failed refresh returns the original expired response untouched.
  pub async fn request(&self, request: &ApiRequest) -> ApiResult<Response> {
    let url = self.resolve(&request.path)?;
    let public = self.is_public(&url);
    let mut token = if public {
      None
    } else {
      self.inner.tokens.access_token()
    };
    let mut attempt = 1;

    loop {
      let response = self.send(request, &url, token.as_deref()).await?;
      debug!(method = %request.method, url = %url, status = %response.status(), attempt, "Response");

      if public || !self.inner.policy.should_retry(attempt, &response) {
        return Ok(response);
      }

      warn!(url = %url, "Access token expired, refreshing");
      let current = self.inner.tokens.access_token();
      // Someone else refreshed since this request was built
      let fresh = if current.is_some() && current != token {
        current
      } else {
        self.inner.refresher.refresh().await
      };

      match fresh {
        Some(new_token) => {
          token = Some(new_token);
          attempt += 1;
        }
        None => {
          warn!(url = %url, "Refresh failed, returning expired response");
          return Ok(response);
        }
      }
    }
  }

  async fn send(
    &self,
    request: &ApiRequest,
    url: &Url,
    token: Option<&str>,
  ) -> ApiResult<Response> {
    let mut builder = self
      .inner
      .http
      .request(request.method.clone(), url.clone())
      .header("Accept", "application/json");
    if !request.query.is_empty() {
      builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }
    if let Some(token) = token {
      builder = builder.bearer_auth(token);
    }
    Ok(builder.send().await?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStorage;
  use futures::future::join_all;
  use serde_json::json;
  use wiremock::matchers::{header, header_exists, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer) -> (ApiClient, Arc<TokenStore>) {
    let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
    let base = Url::parse(&server.uri()).unwrap();
    let client = ApiClient::new(base, tokens.clone(), None).unwrap();
    (client, tokens)
  }

  async fn mount_expired_then_fresh(server: &MockServer) {
    Mock::given(method("GET"))
      .and(path("/api/tickets"))
      .and(header("Authorization", "Bearer old-access"))
      .respond_with(ResponseTemplate::new(401).insert_header(EXPIRY_HEADER, "true"))
      .mount(server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/tickets"))
      .and(header("Authorization", "Bearer new-access"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(server)
      .await;
  }

  #[tokio::test]
  async fn test_resolves_relative_and_absolute_paths() {
    let server = MockServer::start().await;
    let (client, _) = client_for(&server);

    let relative = client.resolve("/api/tickets").unwrap();
    assert_eq!(relative.as_str(), format!("{}/api/tickets", server.uri()));
    let absolute = client.resolve("https://elsewhere.test/x").unwrap();
    assert_eq!(absolute.as_str(), "https://elsewhere.test/x");
  }

  #[tokio::test]
  async fn test_attaches_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/auth/me"))
      .and(header("Authorization", "Bearer a1"))
      .respond_with(ResponseTemplate::new(200))
      .expect(1)
      .mount(&server)
      .await;

    let (client, tokens) = client_for(&server);
    tokens.set_tokens("a1", "r1");

    let response = client.request(&ApiRequest::get("/api/auth/me")).await.unwrap();
    assert_eq!(response.status(), 200);
  }

  #[tokio::test]
  async fn test_public_endpoint_gets_no_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .and(header_exists("Authorization"))
      .respond_with(ResponseTemplate::new(500))
      .expect(0)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(ResponseTemplate::new(200).insert_header(EXPIRY_HEADER, "true"))
      .expect(1)
      .mount(&server)
      .await;

    let (client, tokens) = client_for(&server);
    tokens.set_tokens("a1", "r1");

    let response = client
      .request(&ApiRequest::post(REFRESH_PATH).json(json!({"refresh_token": "r1"})))
      .await
      .unwrap();
    // Expiry on a public endpoint never triggers a refresh loop
    assert_eq!(response.status(), 200);
  }

  #[tokio::test]
  async fn test_expired_token_is_refreshed_and_retried_once() {
    let server = MockServer::start().await;
    mount_expired_then_fresh(&server).await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(ResponseTemplate::new(200).set_body_json(
        json!({"data": {"access_token": "new-access", "refresh_token": "new-refresh"}}),
      ))
      .expect(1)
      .mount(&server)
      .await;

    let (client, tokens) = client_for(&server);
    tokens.set_tokens("old-access", "old-refresh");

    let response = client.request(&ApiRequest::get("/api/tickets")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(tokens.access_token().as_deref(), Some("new-access"));
  }

  #[tokio::test]
  async fn test_concurrent_expired_requests_share_refresh() {
    let server = MockServer::start().await;
    mount_expired_then_fresh(&server).await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({"data": {"access_token": "new-access", "refresh_token": "new-refresh"}}))
          .set_delay(std::time::Duration::from_millis(100)),
      )
      .expect(1)
      .mount(&server)
      .await;

    let (client, tokens) = client_for(&server);
    tokens.set_tokens("old-access", "old-refresh");

    let request = ApiRequest::get("/api/tickets");
    let responses = join_all((0..6).map(|_| client.request(&request))).await;

    for response in responses {
      assert_eq!(response.unwrap().status(), 200);
    }
    let retried = server
      .received_requests()
      .await
      .unwrap()
      .into_iter()
      .filter(|r| {
        r.headers
          .get("Authorization")
          .is_some_and(|v| v.as_bytes() == b"Bearer new-access")
      })
      .count();
    assert_eq!(retried, 6);
  }

  #[tokio::test]
  async fn test_failed_refresh_returns_original_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/tickets"))
      .respond_with(
        ResponseTemplate::new(401)
          .insert_header(EXPIRY_HEADER, "true")
          .set_body_json(json!({"message": "token expired"})),
      )
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(ResponseTemplate::new(401))
      .expect(1)
      .mount(&server)
      .await;

    let (client, tokens) = client_for(&server);
    tokens.set_tokens("old-access", "old-refresh");

    let response = client.request(&ApiRequest::get("/api/tickets")).await.unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(
      response.headers().get(EXPIRY_HEADER).unwrap(),
      "true"
    );
    assert!(!tokens.is_authenticated());
  }

  #[tokio::test]
  async fn test_never_retries_more_than_once() {
    let server = MockServer::start().await;
    // Expired no matter which token is presented
    Mock::given(method("GET"))
      .and(path("/api/tickets"))
      .respond_with(ResponseTemplate::new(401).insert_header(EXPIRY_HEADER, "true"))
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/auth/refresh"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!({"data": {"access_token": "new-access"}})),
      )
      .expect(1)
      .mount(&server)
      .await;

    let (client, tokens) = client_for(&server);
    tokens.set_tokens("old-access", "old-refresh");

    let response = client.request(&ApiRequest::get("/api/tickets")).await.unwrap();
    assert_eq!(response.status(), 401);
  }
}
