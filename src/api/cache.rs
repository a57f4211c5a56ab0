//! Query keys for ticket API calls.

use crate::cache::QueryKey;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheKey {
  /// The signed-in user
  Me,
  /// Every ticket visible to the user
  Tickets,
  /// Tickets assigned to the signed-in user
  AssignedToMe,
  /// One ticket with its messages
  TicketDetail { id: i64 },
  Priorities,
  Statuses,
  /// Users, optionally filtered by role id
  Users { role: Option<u32> },
}

impl QueryKey for CacheKey {
  fn cache_hash(&self) -> String {
    match self {
      Self::Me => "me".to_string(),
      Self::Tickets => "tickets".to_string(),
      Self::AssignedToMe => "tickets:assigned-me".to_string(),
      Self::TicketDetail { id } => format!("ticket:{}", id),
      Self::Priorities => "priorities".to_string(),
      Self::Statuses => "statuses".to_string(),
      Self::Users { role: Some(role) } => format!("users:role:{}", role),
      Self::Users { role: None } => "users".to_string(),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Me => "current user".to_string(),
      Self::Tickets => "all tickets".to_string(),
      Self::AssignedToMe => "tickets assigned to me".to_string(),
      Self::TicketDetail { id } => format!("ticket #{}", id),
      Self::Priorities => "priorities".to_string(),
      Self::Statuses => "statuses".to_string(),
      Self::Users { role: Some(role) } => format!("users with role {}", role),
      Self::Users { role: None } => "all users".to_string(),
    }
  }

  // Priorities never change for the lifetime of a session
  fn never_stale(&self) -> bool {
    matches!(self, Self::Priorities)
  }
}
