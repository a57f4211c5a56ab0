//! Session-scoped query cache.
//!
//! This module provides a resource-agnostic caching mechanism that:
//! - Keeps query results as JSON keyed by a [`QueryKey`]
//! - Serves fresh entries without touching the network
//! - Serves stale entries when the network is unavailable
//! - Supports exact snapshot and restore for optimistic updates
//! - Discards results of fetches that outlived a session reset

mod layer;
mod store;
mod traits;

pub use layer::CacheLayer;
pub use store::{CachedEntry, QueryCache};
pub use traits::{CacheResult, CacheSource, QueryKey};
