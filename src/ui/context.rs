//! State shared by every signed-in view.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::api::{BasicUser, CachedTicketApi, Priority, Status, UserInfo};
use crate::error::ApiResult;
use crate::mutation::{Mutation, MutationError, MutationState, OptimisticUpdater, TicketPatch};
use crate::roles::{Permission, Role, SUPPORT_ROLE_ID};
use crate::ui::view::Notice;

/// The signed-in user and the role they act as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
  pub user: UserInfo,
  pub role: Role,
}

impl Viewer {
  pub fn can(&self, permission: Permission) -> bool {
    self.role.can(permission)
  }
}

/// Mutations started by any view, polled by the app so the outcome is
/// reported even after the view that started one was closed.
#[derive(Clone, Default)]
pub struct MutationTracker {
  inflight: Rc<RefCell<Vec<Mutation>>>,
}

impl MutationTracker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn track(&self, mutation: Mutation) {
    self.inflight.borrow_mut().push(mutation);
  }

  /// Collect notices for mutations that finished since the last poll
  pub fn poll(&self) -> Vec<Notice> {
    let mut inflight = self.inflight.borrow_mut();
    let mut notices = Vec::new();
    inflight.retain_mut(|mutation| {
      mutation.poll();
      match mutation.state() {
        MutationState::Applied => {
          notices.push(Notice::info(format!(
            "#{}: {} updated",
            mutation.ticket_id(),
            patch_label(mutation.patch())
          )));
          false
        }
        MutationState::RolledBack(reason) => {
          notices.push(Notice::error(format!(
            "#{}: {} (change reverted)",
            mutation.ticket_id(),
            reason
          )));
          false
        }
        MutationState::Pending => true,
      }
    });
    notices
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.inflight.borrow().len()
  }
}

fn patch_label(patch: TicketPatch) -> &'static str {
  match patch {
    TicketPatch::Status(_) => "status",
    TicketPatch::Priority(_) => "priority",
    TicketPatch::Assign(_) => "assignee",
  }
}

/// Handles a view needs to talk to the backend.
#[derive(Clone)]
pub struct AppContext {
  pub api: CachedTicketApi,
  pub mutations: Arc<OptimisticUpdater>,
  pub tracker: MutationTracker,
  pub viewer: Viewer,
  pub search_debounce: Duration,
}

impl AppContext {
  /// Start an optimistic update and hand it to the tracker
  pub fn mutate(&self, ticket_id: i64, patch: TicketPatch) -> Result<(), MutationError> {
    let mutation = self.mutations.begin(ticket_id, patch)?;
    self.tracker.track(mutation);
    Ok(())
  }
}

/// Reference data for turning ids into names.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
  pub statuses: Vec<Status>,
  pub priorities: Vec<Priority>,
  /// Support agents, only loaded for roles that assign others
  pub agents: Vec<BasicUser>,
}

impl Lookups {
  pub async fn load(api: &CachedTicketApi, role: Role) -> ApiResult<Self> {
    let (statuses, priorities) = tokio::try_join!(api.statuses(), api.priorities())?;

    let agents = if role.can(Permission::AssignOthers) {
      // Names are a nicety; the view works with ids alone
      api.users(Some(SUPPORT_ROLE_ID)).await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load support agents");
        Vec::new()
      })
    } else {
      Vec::new()
    };

    Ok(Self {
      statuses,
      priorities,
      agents,
    })
  }

  pub fn status(&self, id: i64) -> Option<&Status> {
    self.statuses.iter().find(|s| s.id == id)
  }

  pub fn priority(&self, id: i64) -> Option<&Priority> {
    self.priorities.iter().find(|p| p.id == id)
  }

  pub fn status_name(&self, id: i64) -> String {
    self
      .status(id)
      .map(|s| s.name.clone())
      .unwrap_or_else(|| format!("#{}", id))
  }

  pub fn priority_name(&self, id: i64) -> String {
    self
      .priority(id)
      .map(|p| p.name.clone())
      .unwrap_or_else(|| format!("#{}", id))
  }

  /// Name of a user, "me" for the viewer, "#id" when unknown
  pub fn user_name(&self, id: i64, viewer: &Viewer) -> String {
    if id == viewer.user.id {
      return "me".to_string();
    }
    self
      .agents
      .iter()
      .find(|u| u.id == id)
      .map(|u| u.name.clone())
      .unwrap_or_else(|| format!("#{}", id))
  }

  pub fn assignee_label(&self, assigned_to: Option<i64>, viewer: &Viewer) -> String {
    match assigned_to {
      Some(id) => self.user_name(id, viewer),
      None => "unassigned".to_string(),
    }
  }
}
