//! Ticket API with a session-scoped query cache in front of the reads.

use serde_json::Value;
use std::sync::Arc;

use super::cache::CacheKey;
use super::client::TicketApi;
use super::types::{
  BasicUser, Message, NewTicket, Priority, ProfileUpdate, Status, Ticket, TicketDetail, UserInfo,
};
use crate::cache::{CacheLayer, CacheResult, QueryCache};
use crate::error::ApiResult;
use crate::session::TokenStore;

/// Ticket client with transparent caching support.
///
/// Reads go through the [`CacheLayer`]; writes go straight to the API and
/// then adjust the affected cache entries. Optimistic writes live in
/// [`crate::mutation`].
#[derive(Clone)]
pub struct CachedTicketApi {
  inner: TicketApi,
  cache: CacheLayer,
}

impl CachedTicketApi {
  pub fn new(inner: TicketApi, cache: CacheLayer) -> Self {
    Self { inner, cache }
  }

  pub fn api(&self) -> &TicketApi {
    &self.inner
  }

  pub fn query_cache(&self) -> &Arc<QueryCache> {
    self.cache.cache()
  }

  pub fn tokens(&self) -> &Arc<TokenStore> {
    self.inner.tokens()
  }

  /// Forget everything cached for the previous session.
  pub fn reset_cache(&self) {
    self.query_cache().reset();
  }

  pub async fn login(&self, email: &str, password: &str) -> ApiResult<()> {
    self.inner.login(email, password).await?;
    self.reset_cache();
    Ok(())
  }

  pub async fn register(&self, name: &str, email: &str, password: &str) -> ApiResult<bool> {
    let signed_in = self.inner.register(name, email, password).await?;
    if signed_in {
      self.reset_cache();
    }
    Ok(signed_in)
  }

  pub async fn logout(&self) {
    self.inner.logout().await;
    self.reset_cache();
  }

  pub async fn me(&self) -> ApiResult<CacheResult<UserInfo>> {
    let inner = self.inner.clone();
    self.cache.fetch(&CacheKey::Me, || async move { inner.me().await }).await
  }

  pub async fn tickets(&self, force: bool) -> ApiResult<CacheResult<Vec<Ticket>>> {
    let inner = self.inner.clone();
    let fetcher = || async move { inner.tickets().await };
    if force {
      self.cache.refetch(&CacheKey::Tickets, fetcher).await
    } else {
      self.cache.fetch(&CacheKey::Tickets, fetcher).await
    }
  }

  pub async fn assigned_to_me(&self, force: bool) -> ApiResult<CacheResult<Vec<Ticket>>> {
    let inner = self.inner.clone();
    let fetcher = || async move { inner.assigned_to_me().await };
    if force {
      self.cache.refetch(&CacheKey::AssignedToMe, fetcher).await
    } else {
      self.cache.fetch(&CacheKey::AssignedToMe, fetcher).await
    }
  }

  pub async fn ticket_detail(&self, id: i64, force: bool) -> ApiResult<CacheResult<TicketDetail>> {
    let inner = self.inner.clone();
    let fetcher = || async move { inner.ticket_detail(id).await };
    let key = CacheKey::TicketDetail { id };
    if force {
      self.cache.refetch(&key, fetcher).await
    } else {
      self.cache.fetch(&key, fetcher).await
    }
  }

  pub async fn priorities(&self) -> ApiResult<Vec<Priority>> {
    let inner = self.inner.clone();
    let result = self
      .cache
      .fetch(&CacheKey::Priorities, || async move { inner.priorities().await })
      .await?;
    Ok(result.data)
  }

  pub async fn statuses(&self) -> ApiResult<Vec<Status>> {
    let inner = self.inner.clone();
    let result = self
      .cache
      .fetch(&CacheKey::Statuses, || async move { inner.statuses().await })
      .await?;
    Ok(result.data)
  }

  pub async fn users(&self, role: Option<u32>) -> ApiResult<Vec<BasicUser>> {
    let inner = self.inner.clone();
    let result = self
      .cache
      .fetch(&CacheKey::Users { role }, || async move { inner.users(role).await })
      .await?;
    Ok(result.data)
  }

  /// Create a ticket; the ticket lists are refetched on next read.
  pub async fn create_ticket(&self, ticket: &NewTicket) -> ApiResult<Ticket> {
    let created = self.inner.create_ticket(ticket).await?;
    self.query_cache().invalidate(&CacheKey::Tickets);
    self.query_cache().invalidate(&CacheKey::AssignedToMe);
    Ok(created)
  }

  /// Edit a ticket body and merge the result into the cached detail.
  pub async fn patch_body(&self, id: i64, body: &str) -> ApiResult<Ticket> {
    let updated = self.inner.patch_body(id, body).await?;
    if let Ok(value) = serde_json::to_value(&updated) {
      self
        .query_cache()
        .update(&CacheKey::TicketDetail { id }, |detail| {
          if let Some(detail) = detail.as_object_mut() {
            detail.insert("ticket".to_string(), value);
          }
        });
    }
    Ok(updated)
  }

  /// Post a message and append it to the cached conversation.
  pub async fn post_message(&self, id: i64, body: &str) -> ApiResult<Message> {
    let message = self.inner.post_message(id, body).await?;
    if let Ok(value) = serde_json::to_value(&message) {
      self
        .query_cache()
        .update(&CacheKey::TicketDetail { id }, |detail| append_message(detail, value));
    }
    Ok(message)
  }

  pub async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<UserInfo> {
    let user = self.inner.update_profile(update).await?;
    if let Ok(value) = serde_json::to_value(&user) {
      self.query_cache().set(&CacheKey::Me, value);
    }
    Ok(user)
  }

  pub async fn update_password(&self, current: &str, new: &str) -> ApiResult<Option<String>> {
    self.inner.update_password(current, new).await
  }

  /// Cached detail without touching the network.
  pub fn peek_detail(&self, id: i64) -> Option<TicketDetail> {
    self.query_cache().get_as(&CacheKey::TicketDetail { id })
  }

  pub fn peek_tickets(&self) -> Option<Vec<Ticket>> {
    self.query_cache().get_as(&CacheKey::Tickets)
  }

  pub fn peek_assigned(&self) -> Option<Vec<Ticket>> {
    self.query_cache().get_as(&CacheKey::AssignedToMe)
  }
}

fn append_message(detail: &mut Value, message: Value) {
  let Some(detail) = detail.as_object_mut() else {
    return;
  };
  match detail.get_mut("messages").and_then(Value::as_array_mut) {
    Some(messages) => messages.push(message),
    None => {
      detail.insert("messages".to_string(), Value::Array(vec![message]));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStorage;
  use crate::session::ApiClient;
  use serde_json::json;
  use url::Url;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn detail_json() -> Value {
    json!({
      "ticket": {
        "id": 42, "title": "VPN down", "body": "Cannot connect", "priorityId": 2,
        "statusId": 1, "createdBy": 5, "assignedTo": null,
        "createdAt": "2024-03-01", "updatedAt": "2024-03-01", "resolvedAt": null
      },
      "messages": []
    })
  }

  fn client_for(server: &MockServer) -> CachedTicketApi {
    let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
    tokens.set_tokens("a1", "r1");
    let http = ApiClient::new(Url::parse(&server.uri()).unwrap(), tokens, None).unwrap();
    CachedTicketApi::new(TicketApi::new(http), CacheLayer::new(Arc::new(QueryCache::new())))
  }

  #[tokio::test]
  async fn test_post_message_appends_to_cached_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/tickets/42"))
      .respond_with(ResponseTemplate::new(200).set_body_json(detail_json()))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/tickets/42/messages"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!({
        "id": 9, "senderId": 5, "body": "Still broken",
        "createdAt": "2024-03-02", "updatedAt": "2024-03-02"
      })))
      .mount(&server)
      .await;

    let client = client_for(&server);
    client.ticket_detail(42, false).await.unwrap();
    client.post_message(42, "Still broken").await.unwrap();

    let detail = client.peek_detail(42).unwrap();
    assert_eq!(detail.messages.len(), 1);
    assert_eq!(detail.messages[0].body, "Still broken");
    // Served from cache, no second GET
    let again = client.ticket_detail(42, false).await.unwrap();
    assert_eq!(again.data.messages.len(), 1);
  }

  #[tokio::test]
  async fn test_patch_body_merges_into_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/tickets/42"))
      .respond_with(ResponseTemplate::new(200).set_body_json(detail_json()))
      .mount(&server)
      .await;
    let mut updated = detail_json()["ticket"].clone();
    updated["body"] = json!("Works now");
    Mock::given(method("PATCH"))
      .and(path("/api/tickets/42/body"))
      .respond_with(ResponseTemplate::new(200).set_body_json(updated))
      .mount(&server)
      .await;

    let client = client_for(&server);
    client.ticket_detail(42, false).await.unwrap();
    client.patch_body(42, "Works now").await.unwrap();

    assert_eq!(client.peek_detail(42).unwrap().ticket.body, "Works now");
  }

  #[tokio::test]
  async fn test_create_ticket_invalidates_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/tickets"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/tickets"))
      .respond_with(ResponseTemplate::new(201).set_body_json(detail_json()["ticket"].clone()))
      .mount(&server)
      .await;

    let client = client_for(&server);
    client.tickets(false).await.unwrap();
    client
      .create_ticket(&NewTicket {
        title: "VPN down".into(),
        body: "Cannot connect".into(),
        priority_id: 2,
      })
      .await
      .unwrap();

    assert!(client.peek_tickets().is_none());
    client.tickets(false).await.unwrap();
  }
}
