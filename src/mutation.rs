//! Optimistic ticket mutations with rollback.
//!
//! A mutation patches every cached copy of the ticket (the full list, the
//! assigned-to-me list and the detail) before the request is sent, so the UI
//! reflects the change immediately. If the backend rejects it, the cached
//! copies are put back exactly as they were.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::{CacheKey, CachedTicketApi};
use crate::cache::CachedEntry;
use crate::error::ApiError;

/// A change to one field of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketPatch {
  Status(i64),
  Priority(i64),
  /// `None` unassigns
  Assign(Option<i64>),
}

impl TicketPatch {
  fn field(&self) -> &'static str {
    match self {
      TicketPatch::Status(_) => "statusId",
      TicketPatch::Priority(_) => "priorityId",
      TicketPatch::Assign(_) => "assignedTo",
    }
  }

  fn value(&self) -> Value {
    match self {
      TicketPatch::Status(id) | TicketPatch::Priority(id) => json!(id),
      TicketPatch::Assign(user) => json!(user),
    }
  }
}

/// Where a started mutation stands. A ticket with no [`Mutation`] in flight
/// is idle, which [`OptimisticUpdater::is_pending`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationState {
  Pending,
  Applied,
  /// The backend rejected the change; holds the reason
  RolledBack(String),
}

#[derive(Debug, Error)]
pub enum MutationError {
  #[error("Ticket #{0} is still being updated")]
  Busy(i64),
  #[error(transparent)]
  Api(#[from] ApiError),
}

/// Cached copies of one ticket taken before an optimistic write.
struct Snapshot {
  generation: u64,
  list_rows: Vec<(CacheKey, Option<Value>)>,
  detail: Option<CachedEntry>,
}

const LIST_KEYS: [CacheKey; 2] = [CacheKey::Tickets, CacheKey::AssignedToMe];

/// Runs optimistic mutations against the query cache.
pub struct OptimisticUpdater {
  api: CachedTicketApi,
  pending: Mutex<HashSet<i64>>,
}

impl OptimisticUpdater {
  pub fn new(api: CachedTicketApi) -> Arc<Self> {
    Arc::new(Self {
      api,
      pending: Mutex::new(HashSet::new()),
    })
  }

  /// Whether a mutation for this ticket is waiting on the backend.
  pub fn is_pending(&self, ticket_id: i64) -> bool {
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .contains(&ticket_id)
  }

  /// Apply `patch` to the cache and send it in the background.
  ///
  /// Fails with [`MutationError::Busy`] if the ticket already has a mutation
  /// in flight.
  pub fn begin(self: &Arc<Self>, ticket_id: i64, patch: TicketPatch) -> Result<Mutation, MutationError> {
    let guard = PendingGuard::acquire(self.clone(), ticket_id)?;
    let snapshot = self.snapshot(ticket_id);
    self.apply_local(ticket_id, &patch);

    let (tx, rx) = mpsc::unbounded_channel();
    let this = self.clone();
    tokio::spawn(async move {
      let result = match this.send(ticket_id, patch).await {
        Ok(()) => {
          info!(ticket_id, ?patch, "Ticket updated");
          Ok(())
        }
        Err(e) => {
          warn!(ticket_id, ?patch, error = %e, "Ticket update rejected, rolling back");
          this.rollback(ticket_id, snapshot);
          Err(e.to_string())
        }
      };
      // Release before reporting so the control is usable once the UI hears back
      drop(guard);
      let _ = tx.send(result);
    });

    Ok(Mutation {
      ticket_id,
      patch,
      state: MutationState::Pending,
      receiver: Some(rx),
    })
  }

  /// Apply `patch` and wait for the outcome.
  pub async fn apply(self: &Arc<Self>, ticket_id: i64, patch: TicketPatch) -> Result<MutationState, MutationError> {
    Ok(self.begin(ticket_id, patch)?.wait().await)
  }

  async fn send(&self, ticket_id: i64, patch: TicketPatch) -> Result<(), ApiError> {
    let api = self.api.api();
    match patch {
      TicketPatch::Status(status_id) => api.patch_status(ticket_id, status_id).await,
      TicketPatch::Priority(priority_id) => api.patch_priority(ticket_id, priority_id).await,
      TicketPatch::Assign(user_id) => api.assign(ticket_id, user_id).await,
    }
  }

  fn snapshot(&self, ticket_id: i64) -> Snapshot {
    let cache = self.api.query_cache();
    let list_rows = LIST_KEYS
      .iter()
      .map(|key| {
        let row = cache
          .get(key)
          .and_then(|entry| find_row(&entry.value, ticket_id).cloned());
        (key.clone(), row)
      })
      .collect();

    Snapshot {
      generation: cache.generation(),
      list_rows,
      detail: cache.get(&CacheKey::TicketDetail { id: ticket_id }),
    }
  }

  fn apply_local(&self, ticket_id: i64, patch: &TicketPatch) {
    let cache = self.api.query_cache();
    let (field, value) = (patch.field(), patch.value());

    for key in &LIST_KEYS {
      cache.update(key, |list| {
        if let Some(row) = find_row_mut(list, ticket_id) {
          set_field(row, field, value.clone());
        }
      });
    }
    cache.update(&CacheKey::TicketDetail { id: ticket_id }, |detail| {
      if let Some(ticket) = detail.get_mut("ticket") {
        set_field(ticket, field, value.clone());
      }
    });
  }

  /// Put back this ticket's cached copies.
  ///
  /// Only the ticket's own rows are restored, so a concurrent mutation of
  /// another ticket in the same list survives.
  fn rollback(&self, ticket_id: i64, snapshot: Snapshot) {
    let cache = self.api.query_cache();
    if cache.generation() != snapshot.generation {
      // Session changed while the request was in flight
      return;
    }

    for (key, row) in snapshot.list_rows {
      let Some(row) = row else { continue };
      cache.update(&key, |list| {
        if let Some(current) = find_row_mut(list, ticket_id) {
          *current = row;
        }
      });
    }
    cache.restore(&CacheKey::TicketDetail { id: ticket_id }, snapshot.detail);
  }
}

fn find_row(list: &Value, ticket_id: i64) -> Option<&Value> {
  list
    .as_array()?
    .iter()
    .find(|row| row.get("id").and_then(Value::as_i64) == Some(ticket_id))
}

fn find_row_mut(list: &mut Value, ticket_id: i64) -> Option<&mut Value> {
  list
    .as_array_mut()?
    .iter_mut()
    .find(|row| row.get("id").and_then(Value::as_i64) == Some(ticket_id))
}

fn set_field(object: &mut Value, field: &str, value: Value) {
  if let Some(object) = object.as_object_mut() {
    object.insert(field.to_string(), value);
  }
}

/// Marks a ticket as having a mutation in flight until dropped.
struct PendingGuard {
  updater: Arc<OptimisticUpdater>,
  ticket_id: i64,
}

impl PendingGuard {
  fn acquire(updater: Arc<OptimisticUpdater>, ticket_id: i64) -> Result<Self, MutationError> {
    let inserted = updater
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(ticket_id);
    if !inserted {
      return Err(MutationError::Busy(ticket_id));
    }
    Ok(Self { updater, ticket_id })
  }
}

impl Drop for PendingGuard {
  fn drop(&mut self) {
    self
      .updater
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.ticket_id);
  }
}

/// Handle to one mutation, polled from the UI tick like a query.
pub struct Mutation {
  ticket_id: i64,
  patch: TicketPatch,
  state: MutationState,
  receiver: Option<mpsc::UnboundedReceiver<Result<(), String>>>,
}

impl Mutation {
  pub fn ticket_id(&self) -> i64 {
    self.ticket_id
  }

  pub fn patch(&self) -> TicketPatch {
    self.patch
  }

  pub fn state(&self) -> &MutationState {
    &self.state
  }

  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };

    match receiver.try_recv() {
      Ok(result) => {
        self.finish(result);
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.finish(Err("Update was cancelled".to_string()));
        true
      }
    }
  }

  /// Wait for the outcome.
  pub async fn wait(mut self) -> MutationState {
    if let Some(mut receiver) = self.receiver.take() {
      let result = receiver
        .recv()
        .await
        .unwrap_or_else(|| Err("Update was cancelled".to_string()));
      self.finish(result);
    }
    self.state
  }

  fn finish(&mut self, result: Result<(), String>) {
    self.receiver = None;
    self.state = match result {
      Ok(()) => MutationState::Applied,
      Err(message) => MutationState::RolledBack(message),
    };
  }
}
