//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::store::QueryCache;
use super::traits::{CacheResult, QueryKey};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the views and the ticket API, serving fresh
/// cached data directly and falling back to stale data when the network
/// call fails.
#[derive(Clone)]
pub struct CacheLayer {
  cache: Arc<QueryCache>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl CacheLayer {
  pub fn new(cache: Arc<QueryCache>) -> Self {
    Self {
      cache,
      stale_time: Duration::seconds(60),
    }
  }

  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn cache(&self) -> &Arc<QueryCache> {
    &self.cache
  }

  fn is_stale<K: QueryKey>(&self, key: &K, cached_at: chrono::DateTime<Utc>) -> bool {
    !key.never_stale() && Utc::now() - cached_at > self.stale_time
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Fresh cache entry: return it
  /// 2. Stale or missing: fetch from network and store the result
  /// 3. Network failure with a stale entry: serve the stale entry (offline)
  pub async fn fetch<K, T, E, F, Fut>(&self, key: &K, fetcher: F) -> Result<CacheResult<T>, E>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
  {
    self.load(key, false, fetcher).await
  }

  /// Fetch from network regardless of freshness, still falling back to cache.
  pub async fn refetch<K, T, E, F, Fut>(&self, key: &K, fetcher: F) -> Result<CacheResult<T>, E>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
  {
    self.load(key, true, fetcher).await
  }

  async fn load<K, T, E, F, Fut>(
    &self,
    key: &K,
    force: bool,
    fetcher: F,
  ) -> Result<CacheResult<T>, E>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
  {
    let generation = self.cache.generation();
    let cached = self.cache.get(key).and_then(|entry| {
      serde_json::from_value::<T>(entry.value)
        .ok()
        .map(|data| (data, entry.cached_at))
    });

    if let Some((data, cached_at)) = cached {
      if !force && !self.is_stale(key, cached_at) {
        return Ok(CacheResult::from_cache(data, cached_at));
      }

      return match fetcher().await {
        Ok(fresh) => {
          self.store(key, &fresh, generation);
          Ok(CacheResult::from_network(fresh))
        }
        Err(e) => {
          debug!(key = %key.description(), error = %e, "Fetch failed, serving cached data");
          Ok(CacheResult::offline(data, cached_at))
        }
      };
    }

    let data = fetcher().await?;
    self.store(key, &data, generation);
    Ok(CacheResult::from_network(data))
  }

  fn store<K: QueryKey, T: Serialize>(&self, key: &K, data: &T, generation: u64) {
    match serde_json::to_value(data) {
      Ok(value) => {
        self.cache.set_if_current(key, value, generation);
      }
      Err(e) => warn!(key = %key.description(), error = %e, "Failed to cache result"),
    }
  }
}
