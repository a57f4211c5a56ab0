use crate::api::{CachedTicketApi, Ticket};
use crate::cache::CacheResult;
use crate::debounce::Debounced;
use crate::error::ApiResult;
use crate::query::{Query, QueryState};
use crate::roles::{Permission, Role};
use crate::theme::Palette;
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::context::{AppContext, Lookups};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{parse_hex_color, priority_color, status_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{CreateTicketView, TicketDetailView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Which tickets a list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketScope {
  All,
  AssignedToMe,
  /// Tickets opened by this user
  CreatedBy(i64),
}

impl TicketScope {
  /// Scope of the `tickets` command: everything for staff, own tickets for users
  pub fn for_role(role: Role, user_id: i64) -> Self {
    match role {
      Role::Manager | Role::Support => TicketScope::All,
      Role::User | Role::Visitor => TicketScope::CreatedBy(user_id),
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      TicketScope::All => "Tickets",
      TicketScope::AssignedToMe => "Assigned to me",
      TicketScope::CreatedBy(_) => "My tickets",
    }
  }

  pub async fn load(self, api: &CachedTicketApi, force: bool) -> ApiResult<CacheResult<Vec<Ticket>>> {
    match self {
      TicketScope::All => api.tickets(force).await,
      TicketScope::AssignedToMe => api.assigned_to_me(force).await,
      TicketScope::CreatedBy(user_id) => {
        let mut result = api.tickets(force).await?;
        result.data.retain(|t| t.created_by == user_id);
        Ok(result)
      }
    }
  }

  /// Current cached copy, including optimistic changes
  pub fn peek(self, api: &CachedTicketApi) -> Option<Vec<Ticket>> {
    match self {
      TicketScope::All => api.peek_tickets(),
      TicketScope::AssignedToMe => api.peek_assigned(),
      TicketScope::CreatedBy(user_id) => api.peek_tickets().map(|mut tickets| {
        tickets.retain(|t| t.created_by == user_id);
        tickets
      }),
    }
  }
}

/// Build the list query for a scope. `force` is only honoured by `refetch`.
pub fn tickets_query(api: &CachedTicketApi, scope: TicketScope) -> Query<CacheResult<Vec<Ticket>>> {
  let api = api.clone();
  let first = std::sync::atomic::AtomicBool::new(true);
  Query::new(move || {
    let api = api.clone();
    // The first load may be served from cache; later loads are explicit refreshes
    let force = !first.swap(false, std::sync::atomic::Ordering::Relaxed);
    async move { scope.load(&api, force).await.map_err(|e| e.to_string()) }
  })
}

pub fn lookups_query(ctx: &AppContext) -> Query<Lookups> {
  let api = ctx.api.clone();
  let role = ctx.viewer.role;
  Query::new(move || {
    let api = api.clone();
    async move { Lookups::load(&api, role).await.map_err(|e| e.to_string()) }
  })
}

/// Pull optimistic changes made elsewhere into a list query.
pub fn sync_from_cache(query: &mut Query<CacheResult<Vec<Ticket>>>, api: &CachedTicketApi, scope: TicketScope) {
  if query.is_loading() {
    return;
  }
  let (Some(current), Some(cached)) = (query.data(), scope.peek(api)) else {
    return;
  };
  if current.data != cached {
    let next = CacheResult {
      data: cached,
      source: current.source,
      cached_at: current.cached_at,
    };
    query.set_data(next);
  }
}

/// Client-side filters over a loaded list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
  pub search: String,
  pub status: Option<i64>,
  pub priority: Option<i64>,
  pub unassigned_only: bool,
}

impl TicketFilter {
  pub fn matches(&self, ticket: &Ticket) -> bool {
    if self.status.is_some_and(|s| s != ticket.status_id) {
      return false;
    }
    if self.priority.is_some_and(|p| p != ticket.priority_id) {
      return false;
    }
    if self.unassigned_only && ticket.assigned_to.is_some() {
      return false;
    }

    let needle = self.search.trim().to_lowercase();
    if needle.is_empty() {
      return true;
    }
    let id = needle.strip_prefix('#').unwrap_or(&needle);
    ticket.id.to_string() == id
      || ticket.title.to_lowercase().contains(&needle)
      || ticket.body.to_lowercase().contains(&needle)
  }

  pub fn apply<'a>(&self, tickets: &'a [Ticket]) -> Vec<&'a Ticket> {
    tickets.iter().filter(|t| self.matches(t)).collect()
  }

  pub fn is_active(&self) -> bool {
    *self != TicketFilter::default()
  }
}

/// Step an optional filter value through `ids`, wrapping back to "any".
pub fn cycle_filter(current: Option<i64>, ids: &[i64]) -> Option<i64> {
  match current {
    None => ids.first().copied(),
    Some(id) => {
      let next = ids.iter().position(|&x| x == id).map(|i| i + 1);
      next.and_then(|i| ids.get(i)).copied()
    }
  }
}

/// Status color: the backend's own color when it sent one
pub fn status_display_color(lookups: &Lookups, status_id: i64, palette: &Palette) -> Color {
  let status = lookups.status(status_id);
  status
    .and_then(|s| parse_hex_color(&s.color))
    .unwrap_or_else(|| status_color(&lookups.status_name(status_id), palette))
}

pub fn priority_display_color(lookups: &Lookups, priority_id: i64, palette: &Palette) -> Color {
  let priority = lookups.priority(priority_id);
  priority
    .and_then(|p| parse_hex_color(&p.color))
    .unwrap_or_else(|| priority_color(priority.map(|p| p.level).unwrap_or(0), palette))
}

/// Render ticket rows; shared with the dashboard
pub fn ticket_items(
  tickets: &[&Ticket],
  lookups: &Lookups,
  ctx: &AppContext,
  palette: &Palette,
) -> Vec<ListItem<'static>> {
  tickets
    .iter()
    .map(|ticket| {
      let status = lookups.status_name(ticket.status_id);
      let priority_name = lookups.priority_name(ticket.priority_id);
      let priority_style = Style::default().fg(priority_display_color(lookups, ticket.priority_id, palette));
      let pending = ctx.mutations.is_pending(ticket.id);

      let mut spans = vec![
        Span::styled(format!("#{:<6}", ticket.id), Style::default().fg(palette.accent)),
        Span::styled(
          format!("{:<12}", truncate(&status, 12)),
          Style::default().fg(status_display_color(lookups, ticket.status_id, palette)),
        ),
        Span::raw(" "),
        Span::styled(format!("{:<9}", truncate(&priority_name, 9)), priority_style),
        Span::raw(" "),
        Span::styled(
          format!("{:<14}", truncate(&lookups.assignee_label(ticket.assigned_to, &ctx.viewer), 14)),
          Style::default().fg(palette.muted),
        ),
        Span::raw(" "),
        Span::styled(truncate(&ticket.title, 60), Style::default().fg(palette.fg)),
      ];
      if pending {
        spans.push(Span::styled(" (saving)", Style::default().fg(palette.warning)));
      }
      ListItem::new(Line::from(spans))
    })
    .collect()
}

/// View for browsing a list of tickets
pub struct TicketListView {
  ctx: AppContext,
  scope: TicketScope,
  query: Query<CacheResult<Vec<Ticket>>>,
  lookups: Query<Lookups>,
  list_state: ListState,
  search: SearchInput,
  search_term: Debounced<String>,
  filter: TicketFilter,
}

impl TicketListView {
  pub fn new(ctx: AppContext, scope: TicketScope) -> Self {
    let mut query = tickets_query(&ctx.api, scope);
    query.fetch();
    let mut lookups = lookups_query(&ctx);
    lookups.fetch();
    let search_term = Debounced::new(String::new(), ctx.search_debounce);

    Self {
      ctx,
      scope,
      query,
      lookups,
      list_state: ListState::default(),
      search: SearchInput::new(),
      search_term,
      filter: TicketFilter::default(),
    }
  }

  fn tickets(&self) -> &[Ticket] {
    self.query.data().map(|r| r.data.as_slice()).unwrap_or(&[])
  }

  fn visible(&self) -> Vec<&Ticket> {
    self.filter.apply(self.tickets())
  }

  fn lookup_data(&self) -> Lookups {
    self.lookups.data().cloned().unwrap_or_default()
  }

  fn selected_ticket_id(&self) -> Option<i64> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|t| t.id)
  }

  fn filter_summary(&self, lookups: &Lookups) -> String {
    let mut parts = Vec::new();
    if !self.filter.search.is_empty() {
      parts.push(format!("/{}", self.filter.search));
    }
    if let Some(status) = self.filter.status {
      parts.push(format!("status={}", lookups.status_name(status)));
    }
    if let Some(priority) = self.filter.priority {
      parts.push(format!("priority={}", lookups.priority_name(priority)));
    }
    if self.filter.unassigned_only {
      parts.push("unassigned".to_string());
    }
    parts.join(" ")
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let lookups = self.lookup_data();
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let label = self.scope.label();
    let mut title = match self.query.state() {
      QueryState::Loading => format!(" {} (loading...) ", label),
      QueryState::Error(e) => format!(" {} (error: {}) ", label, e),
      _ => format!(" {} ({}/{}) ", label, len, self.tickets().len()),
    };
    if self.query.data().is_some_and(|r| r.is_offline()) {
      title.push_str("[offline] ");
    }
    if self.filter.is_active() {
      title.push_str(&format!("[{}] ", self.filter_summary(&lookups)));
    }
    if self.search_term.is_pending() {
      title.push_str("[filtering...] ");
    }

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.border));

    if len == 0 {
      let content = if self.query.is_loading() {
        "Loading tickets..."
      } else if self.query.error().is_some() {
        "Failed to load tickets. Press 'r' to retry."
      } else if self.filter.is_active() {
        "No tickets match the current filters. Press 'c' to clear them."
      } else {
        "No tickets found."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(palette.muted));
      frame.render_widget(paragraph, area);
      return;
    }

    let visible = self.visible();
    let items = ticket_items(&visible, &lookups, &self.ctx, palette);
    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(palette.highlight).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for TicketListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Changed(term)) => {
        self.search_term.set(term);
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Submitted) => {
        self.search_term.flush();
        self.filter.search = self.search_term.value().clone();
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.list_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.list_state.select_last(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('s') => {
        let ids: Vec<i64> = self.lookup_data().statuses.iter().map(|s| s.id).collect();
        self.filter.status = cycle_filter(self.filter.status, &ids);
        self.list_state.select(Some(0));
      }
      KeyCode::Char('p') => {
        let ids: Vec<i64> = self.lookup_data().priorities.iter().map(|p| p.id).collect();
        self.filter.priority = cycle_filter(self.filter.priority, &ids);
        self.list_state.select(Some(0));
      }
      KeyCode::Char('u') => {
        self.filter.unassigned_only = !self.filter.unassigned_only;
        self.list_state.select(Some(0));
      }
      KeyCode::Char('c') => {
        self.filter = TicketFilter::default();
        self.search_term = Debounced::new(String::new(), self.ctx.search_debounce);
        self.search = SearchInput::new();
      }
      KeyCode::Char('n') if self.ctx.viewer.can(Permission::CreateTicket) => {
        return ViewAction::Push(Box::new(CreateTicketView::new(self.ctx.clone())));
      }
      KeyCode::Enter => {
        if let Some(id) = self.selected_ticket_id() {
          return ViewAction::Push(Box::new(TicketDetailView::new(self.ctx.clone(), id)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    self.render_list(frame, area, palette);
    self.search.render_overlay(frame, area, palette);
  }

  fn breadcrumb_label(&self) -> String {
    self.scope.label().to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();
    self.lookups.poll();
    if self.search_term.poll() {
      self.filter.search = self.search_term.value().clone();
      self.list_state.select(Some(0));
    }
    sync_from_cache(&mut self.query, &self.ctx.api, self.scope);
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("s/p/u", "filter").with_priority(30),
      ShortcutInfo::new("c", "clear").with_priority(40),
      ShortcutInfo::new("n", "new").enabled_if(self.ctx.viewer.can(Permission::CreateTicket)).with_priority(50),
      ShortcutInfo::new("r", "refresh").with_priority(60),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ticket(id: i64, title: &str, status_id: i64, priority_id: i64, assigned_to: Option<i64>) -> Ticket {
    Ticket {
      id,
      title: title.to_string(),
      body: format!("body of {}", title),
      priority_id,
      status_id,
      created_by: 1,
      assigned_to,
      created_at: String::new(),
      updated_at: String::new(),
      resolved_at: None,
    }
  }

  fn sample() -> Vec<Ticket> {
    vec![
      ticket(1, "VPN drops hourly", 1, 2, None),
      ticket(2, "Printer jam", 2, 1, Some(7)),
      ticket(42, "Laptop won't boot", 1, 3, Some(7)),
    ]
  }

  fn ids(tickets: Vec<&Ticket>) -> Vec<i64> {
    tickets.into_iter().map(|t| t.id).collect()
  }

  #[test]
  fn test_search_matches_title_body_and_id() {
    let tickets = sample();
    let mut filter = TicketFilter {
      search: "vpn".into(),
      ..Default::default()
    };
    assert_eq!(ids(filter.apply(&tickets)), vec![1]);

    filter.search = "#42".into();
    assert_eq!(ids(filter.apply(&tickets)), vec![42]);

    filter.search = "body of printer".into();
    assert_eq!(ids(filter.apply(&tickets)), vec![2]);
  }

  #[test]
  fn test_filters_combine() {
    let tickets = sample();
    let filter = TicketFilter {
      status: Some(1),
      unassigned_only: true,
      ..Default::default()
    };
    assert_eq!(ids(filter.apply(&tickets)), vec![1]);

    let filter = TicketFilter {
      priority: Some(3),
      ..Default::default()
    };
    assert_eq!(ids(filter.apply(&tickets)), vec![42]);
    assert!(filter.is_active());
    assert!(!TicketFilter::default().is_active());
  }

  #[test]
  fn test_cycle_filter_wraps_to_any() {
    let ids = [1, 2, 3];
    assert_eq!(cycle_filter(None, &ids), Some(1));
    assert_eq!(cycle_filter(Some(1), &ids), Some(2));
    assert_eq!(cycle_filter(Some(3), &ids), None);
    assert_eq!(cycle_filter(Some(9), &ids), None);
    assert_eq!(cycle_filter(None, &[]), None);
  }

  #[test]
  fn test_scope_for_role() {
    assert_eq!(TicketScope::for_role(Role::Manager, 5), TicketScope::All);
    assert_eq!(TicketScope::for_role(Role::Support, 5), TicketScope::All);
    assert_eq!(TicketScope::for_role(Role::User, 5), TicketScope::CreatedBy(5));
  }
}
