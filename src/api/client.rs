use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::api_types::{
  ItemEnvelope, ListEnvelope, LoginPayload, MessageBody, PasswordChange, RegisterPayload,
};
use super::types::{
  BasicUser, Message, NewTicket, Priority, ProfileUpdate, Status, Ticket, TicketDetail, UserInfo,
};
use crate::error::{ApiError, ApiResult};
use crate::session::{ApiClient, ApiRequest, SessionEvent, TokenPair, TokenStore};

const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";
const LOGOUT_PATH: &str = "/api/auth/logout";
const ME_PATH: &str = "/api/auth/me";
const TICKETS_PATH: &str = "/api/tickets";
const ASSIGNED_TO_ME_PATH: &str = "/api/tickets/assigned/me";
const PRIORITIES_PATH: &str = "/api/priorities";
const STATUSES_PATH: &str = "/api/status";
const USERS_PATH: &str = "/api/users";
const PROFILE_PATH: &str = "/api/users/me";
const PASSWORD_PATH: &str = "/api/users/me/password";

fn ticket_path(id: i64) -> String {
  format!("{}/{}", TICKETS_PATH, id)
}

/// Typed wrapper over the ticket desk REST API.
#[derive(Clone)]
pub struct TicketApi {
  http: ApiClient,
}

impl TicketApi {
  pub fn new(http: ApiClient) -> Self {
    Self { http }
  }

  pub fn tokens(&self) -> &Arc<TokenStore> {
    self.http.tokens()
  }

  pub fn base_url(&self) -> &Url {
    self.http.base_url()
  }

  async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest, fallback: &str) -> ApiResult<T> {
    let response = self.http.request(&request).await?;
    if !response.status().is_success() {
      return Err(ApiError::from_response(response, fallback).await);
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{}: {}", fallback, e)))
  }

  async fn send_item<T: DeserializeOwned>(&self, request: ApiRequest, fallback: &str) -> ApiResult<T> {
    let envelope: ItemEnvelope<T> = self.send_json(request, fallback).await?;
    Ok(envelope.into_inner())
  }

  async fn send_list<T: DeserializeOwned>(
    &self,
    request: ApiRequest,
    fallback: &str,
  ) -> ApiResult<Vec<T>> {
    let envelope: ListEnvelope<T> = self.send_json(request, fallback).await?;
    Ok(envelope.into_vec())
  }

  /// Send a request whose success body is irrelevant.
  async fn send_unit(&self, request: ApiRequest, fallback: &str) -> ApiResult<()> {
    let response = self.http.request(&request).await?;
    if !response.status().is_success() {
      return Err(ApiError::from_response(response, fallback).await);
    }
    Ok(())
  }

  fn store_tokens(&self, pair: &TokenPair) {
    let tokens = self.tokens();
    tokens.set_access_token(Some(&pair.access_token));
    tokens.set_refresh_token(pair.refresh_token.as_deref());
    tokens.notify(SessionEvent::SignedIn);
  }

  pub async fn login(&self, email: &str, password: &str) -> ApiResult<()> {
    let request = ApiRequest::post(LOGIN_PATH).json(json!(LoginPayload { email, password }));
    let body: serde_json::Value = self.send_json(request, "Login failed").await?;
    let pair = TokenPair::from_json(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    self.store_tokens(&pair);
    info!("Signed in");
    Ok(())
  }

  /// Create an account. Returns whether the backend also signed the user in.
  pub async fn register(&self, name: &str, email: &str, password: &str) -> ApiResult<bool> {
    let request = ApiRequest::post(REGISTER_PATH).json(json!(RegisterPayload {
      name,
      email,
      password
    }));
    let body: serde_json::Value = self.send_json(request, "Registration failed").await?;
    match TokenPair::from_json(body) {
      Ok(pair) => {
        self.store_tokens(&pair);
        info!("Registered and signed in");
        Ok(true)
      }
      Err(_) => {
        info!("Registered");
        Ok(false)
      }
    }
  }

  /// End the session. Local state is cleared even if the backend call fails.
  pub async fn logout(&self) {
    let tokens = self.tokens();
    let mut request = ApiRequest::post(LOGOUT_PATH);
    if let Some(refresh_token) = tokens.refresh_token() {
      request = request.json(json!({ "refresh_token": refresh_token }));
    }
    if let Err(e) = self.send_unit(request, "Logout failed").await {
      warn!(error = %e, "Logout request failed, clearing local session anyway");
    }
    tokens.sign_out();
    tokens.notify(SessionEvent::SignedOut);
    info!("Signed out");
  }

  pub async fn me(&self) -> ApiResult<UserInfo> {
    self
      .send_item(ApiRequest::get(ME_PATH), "Failed to fetch user")
      .await
  }

  pub async fn tickets(&self) -> ApiResult<Vec<Ticket>> {
    self
      .send_list(ApiRequest::get(TICKETS_PATH), "Failed to fetch tickets")
      .await
  }

  pub async fn assigned_to_me(&self) -> ApiResult<Vec<Ticket>> {
    self
      .send_list(
        ApiRequest::get(ASSIGNED_TO_ME_PATH),
        "Failed to fetch assigned tickets",
      )
      .await
  }

  pub async fn ticket_detail(&self, id: i64) -> ApiResult<TicketDetail> {
    self
      .send_item(ApiRequest::get(ticket_path(id)), "Failed to fetch ticket")
      .await
  }

  pub async fn priorities(&self) -> ApiResult<Vec<Priority>> {
    self
      .send_list(ApiRequest::get(PRIORITIES_PATH), "Failed to fetch priorities")
      .await
  }

  pub async fn statuses(&self) -> ApiResult<Vec<Status>> {
    self
      .send_list(ApiRequest::get(STATUSES_PATH), "Failed to fetch statuses")
      .await
  }

  pub async fn users(&self, role: Option<u32>) -> ApiResult<Vec<BasicUser>> {
    let mut request = ApiRequest::get(USERS_PATH);
    if let Some(role) = role {
      request = request.query("role", role);
    }
    self.send_list(request, "Failed to fetch users").await
  }

  pub async fn create_ticket(&self, ticket: &NewTicket) -> ApiResult<Ticket> {
    let request = ApiRequest::post(TICKETS_PATH).json(json!(ticket));
    self.send_item(request, "Failed to create ticket").await
  }

  pub async fn patch_status(&self, id: i64, status_id: i64) -> ApiResult<()> {
    let request =
      ApiRequest::patch(format!("{}/status", ticket_path(id))).json(json!({ "status_id": status_id }));
    self
      .send_unit(request, "Failed to update ticket status")
      .await
  }

  pub async fn patch_priority(&self, id: i64, priority_id: i64) -> ApiResult<()> {
    let request = ApiRequest::patch(format!("{}/priority", ticket_path(id)))
      .json(json!({ "priority_id": priority_id }));
    self
      .send_unit(request, "Failed to update ticket priority")
      .await
  }

  /// Assign a ticket; `None` unassigns it.
  pub async fn assign(&self, id: i64, user_id: Option<i64>) -> ApiResult<()> {
    let request =
      ApiRequest::patch(format!("{}/assign", ticket_path(id))).json(json!({ "user_id": user_id }));
    self.send_unit(request, "Failed to assign ticket").await
  }

  pub async fn patch_body(&self, id: i64, body: &str) -> ApiResult<Ticket> {
    let request = ApiRequest::patch(format!("{}/body", ticket_path(id))).json(json!({ "body": body }));
    self
      .send_item(request, "Failed to update ticket body")
      .await
  }

  pub async fn post_message(&self, id: i64, body: &str) -> ApiResult<Message> {
    let request =
      ApiRequest::post(format!("{}/messages", ticket_path(id))).json(json!({ "body": body }));
    self.send_item(request, "Failed to send message").await
  }

  pub async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<UserInfo> {
    let request = ApiRequest::patch(PROFILE_PATH).json(json!(update));
    self.send_item(request, "Failed to update profile").await
  }

  /// Change the password. Returns the backend's confirmation, if any.
  pub async fn update_password(&self, current: &str, new: &str) -> ApiResult<Option<String>> {
    let request = ApiRequest::patch(PASSWORD_PATH).json(json!(PasswordChange {
      current_password: current,
      new_password: new,
    }));
    let response = self.http.request(&request).await?;
    if !response.status().is_success() {
      return Err(ApiError::from_response(response, "Failed to update password").await);
    }
    let bytes = response.bytes().await?;
    let body: MessageBody = serde_json::from_slice(&bytes).unwrap_or_default();
    Ok(body.message)
  }
}
