//! Ticket desk REST API: wire types, endpoint wrappers and cached access.

mod api_types;
mod cache;
mod cached_client;
mod client;
mod types;

pub use cache::CacheKey;
pub use cached_client::CachedTicketApi;
pub use client::TicketApi;
pub use types::{
  BasicUser, NewTicket, Priority, ProfileUpdate, Status, Ticket, TicketDetail, UserInfo,
};
