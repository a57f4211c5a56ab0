use serde::{Deserialize, Serialize};

use super::api_types::RawUser;
use crate::roles::Role;

/// A support ticket as the backend returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
  pub id: i64,
  pub title: String,
  #[serde(default)]
  pub body: String,
  pub priority_id: i64,
  pub status_id: i64,
  pub created_by: i64,
  pub assigned_to: Option<i64>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
  #[serde(default)]
  pub resolved_at: Option<String>,
}

/// A ticket together with its conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDetail {
  pub ticket: Ticket,
  #[serde(default)]
  pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
  pub id: i64,
  pub sender_id: i64,
  pub body: String,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub level: i64,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub color: String,
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawUser", rename_all = "camelCase")]
pub struct UserInfo {
  pub id: i64,
  pub name: String,
  pub email: String,
  pub roles: Vec<Role>,
  pub created_at: String,
  pub updated_at: String,
  pub profile_image: Option<String>,
}

/// A user as listed by `GET /api/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawUser")]
pub struct BasicUser {
  pub id: i64,
  pub name: String,
  pub roles: Vec<Role>,
}

impl From<RawUser> for UserInfo {
  fn from(raw: RawUser) -> Self {
    let roles = raw.normalized_roles();
    Self {
      id: raw.id,
      name: raw.name,
      email: raw.email,
      roles,
      created_at: raw.created_at,
      updated_at: raw.updated_at,
      profile_image: raw.profile_image,
    }
  }
}

impl From<RawUser> for BasicUser {
  fn from(raw: RawUser) -> Self {
    let roles = raw.normalized_roles();
    Self {
      id: raw.id,
      name: raw.name,
      roles,
    }
  }
}

/// Payload for creating a ticket.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
  pub title: String,
  pub body: String,
  pub priority_id: i64,
}

/// Fields of the profile that can be changed. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
}
