//! Wire-only shapes that differ from the domain types.

use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// User as sent by the backend: either `roles: [...]` or a single `role`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
  pub id: i64,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub roles: Option<Vec<Role>>,
  #[serde(default)]
  pub role: Option<Role>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
  #[serde(default)]
  pub profile_image: Option<String>,
}

impl RawUser {
  pub fn normalized_roles(&self) -> Vec<Role> {
    match (&self.roles, self.role) {
      (Some(roles), _) if !roles.is_empty() => roles.clone(),
      (_, Some(role)) => vec![role],
      _ => Vec::new(),
    }
  }
}

/// List endpoints answer with a bare array or `{ "data": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
  Bare(Vec<T>),
  Wrapped { data: Vec<T> },
}

impl<T> ListEnvelope<T> {
  pub fn into_vec(self) -> Vec<T> {
    match self {
      ListEnvelope::Bare(items) => items,
      ListEnvelope::Wrapped { data } => data,
    }
  }
}

/// Single resources may also arrive wrapped in `{ "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ItemEnvelope<T> {
  Wrapped { data: T },
  Bare(T),
}

impl<T> ItemEnvelope<T> {
  pub fn into_inner(self) -> T {
    match self {
      ItemEnvelope::Wrapped { data } => data,
      ItemEnvelope::Bare(item) => item,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct LoginPayload<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RegisterPayload<'a> {
  pub name: &'a str,
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange<'a> {
  pub current_password: &'a str,
  pub new_password: &'a str,
}

/// Informational `{ "message": ... }` body on success.
#[derive(Debug, Default, Deserialize)]
pub struct MessageBody {
  #[serde(default)]
  pub message: Option<String>,
}
