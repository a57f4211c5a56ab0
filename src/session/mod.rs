//! Session lifecycle: token persistence, refresh and authenticated requests.
//!
//! The token pair is the only shared mutable resource in the program. Every
//! write goes through [`TokenStore`]; the [`ApiClient`] reads from it and asks
//! the [`RefreshCoordinator`] for a new access token when the backend flags
//! the current one as expired.

mod client;
mod refresh;
mod token_store;
mod watcher;

pub use client::{ApiClient, ApiRequest, EXPIRY_HEADER};
pub use refresh::{RefreshCoordinator, TokenPair};
pub use token_store::TokenStore;
pub use watcher::StorageWatcher;

/// Path of the refresh endpoint, relative to the base URL.
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// The access/refresh token pair held by this process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
  pub access_token: Option<String>,
  pub refresh_token: Option<String>,
}

impl Session {
  pub fn is_authenticated(&self) -> bool {
    self.access_token.is_some()
  }
}

/// Session transitions broadcast to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
  /// Tokens were stored after a successful login
  SignedIn,
  /// Tokens changed under us (refresh here or in another instance)
  TokensChanged,
  /// The session ended by request, here or in another instance
  SignedOut,
  /// Refresh failed; the user has to log in again
  Expired,
}
