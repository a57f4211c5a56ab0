use std::collections::BTreeMap;

use crate::api::Ticket;
use crate::cache::CacheResult;
use crate::query::{Query, QueryState};
use crate::roles::{Permission, Role};
use crate::theme::Palette;
use crate::ui::context::{AppContext, Lookups};
use crate::ui::ensure_valid_selection;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::ticket_list::{
  lookups_query, priority_display_color, status_display_color, sync_from_cache, ticket_items,
  tickets_query, TicketScope,
};
use crate::ui::views::{CreateTicketView, TicketDetailView, TicketListView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListState, Paragraph};

const RECENT_LIMIT: usize = 15;

/// Counts shown on a dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardStats {
  pub total: usize,
  /// status id -> count
  pub by_status: BTreeMap<i64, usize>,
  /// priority id -> count
  pub by_priority: BTreeMap<i64, usize>,
  pub unassigned: usize,
  /// (assignee id, count), busiest first
  pub workload: Vec<(i64, usize)>,
}

impl DashboardStats {
  pub fn compute(tickets: &[Ticket]) -> Self {
    let mut stats = DashboardStats {
      total: tickets.len(),
      ..Default::default()
    };
    let mut workload: BTreeMap<i64, usize> = BTreeMap::new();

    for ticket in tickets {
      *stats.by_status.entry(ticket.status_id).or_default() += 1;
      *stats.by_priority.entry(ticket.priority_id).or_default() += 1;
      match ticket.assigned_to {
        Some(user) => *workload.entry(user).or_default() += 1,
        None => stats.unassigned += 1,
      }
    }

    stats.workload = workload.into_iter().collect();
    // Stable: ties stay ordered by user id
    stats.workload.sort_by(|a, b| b.1.cmp(&a.1));
    stats
  }
}

/// Where a role's dashboard gets its tickets from
pub fn dashboard_scope(role: Role, user_id: i64) -> TicketScope {
  match role {
    Role::Manager => TicketScope::All,
    Role::Support => TicketScope::AssignedToMe,
    Role::User | Role::Visitor => TicketScope::CreatedBy(user_id),
  }
}

/// Most recently updated first
fn recent(tickets: &[Ticket]) -> Vec<&Ticket> {
  let mut sorted: Vec<&Ticket> = tickets.iter().collect();
  sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
  sorted.truncate(RECENT_LIMIT);
  sorted
}

/// Landing view after sign-in, shaped by the active role.
pub struct DashboardView {
  ctx: AppContext,
  scope: TicketScope,
  query: Query<CacheResult<Vec<Ticket>>>,
  lookups: Query<Lookups>,
  list_state: ListState,
}

impl DashboardView {
  pub fn new(ctx: AppContext) -> Self {
    let scope = dashboard_scope(ctx.viewer.role, ctx.viewer.user.id);
    let mut query = tickets_query(&ctx.api, scope);
    query.fetch();
    let mut lookups = lookups_query(&ctx);
    lookups.fetch();

    Self {
      ctx,
      scope,
      query,
      lookups,
      list_state: ListState::default(),
    }
  }

  fn tickets(&self) -> &[Ticket] {
    self.query.data().map(|r| r.data.as_slice()).unwrap_or(&[])
  }

  fn title(&self) -> &'static str {
    match self.ctx.viewer.role {
      Role::Manager => "Manager dashboard",
      Role::Support => "Support dashboard",
      Role::User | Role::Visitor => "My tickets",
    }
  }

  fn stat_lines(&self, stats: &DashboardStats, lookups: &Lookups, palette: &Palette) -> Vec<Line<'static>> {
    let heading = |text: &str| Line::styled(text.to_string(), Style::default().fg(palette.accent).bold());
    let row = |label: String, count: usize, color: Color| {
      Line::from(vec![
        Span::styled(format!("  {:<18}", label), Style::default().fg(color)),
        Span::styled(count.to_string(), Style::default().fg(palette.fg).bold()),
      ])
    };

    let mut lines = vec![row("Total".to_string(), stats.total, palette.fg), Line::default()];

    lines.push(heading("By status"));
    for (&status, &count) in &stats.by_status {
      let color = status_display_color(lookups, status, palette);
      lines.push(row(lookups.status_name(status), count, color));
    }

    match self.ctx.viewer.role {
      Role::Manager => {
        lines.push(Line::default());
        lines.push(row("Unassigned".to_string(), stats.unassigned, palette.warning));
        lines.push(Line::default());
        lines.push(heading("Workload"));
        if stats.workload.is_empty() {
          lines.push(Line::styled("  nobody assigned yet", Style::default().fg(palette.muted)));
        }
        for &(user, count) in &stats.workload {
          lines.push(row(lookups.user_name(user, &self.ctx.viewer), count, palette.fg));
        }
      }
      Role::Support => {
        lines.push(Line::default());
        lines.push(heading("By priority"));
        for (&priority, &count) in &stats.by_priority {
          lines.push(row(
            lookups.priority_name(priority),
            count,
            priority_display_color(lookups, priority, palette),
          ));
        }
      }
      Role::User | Role::Visitor => {}
    }

    lines
  }

  fn selected_ticket_id(&self) -> Option<i64> {
    let idx = self.list_state.selected()?;
    recent(self.tickets()).get(idx).map(|t| t.id)
  }
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('t') => {
        return ViewAction::Push(Box::new(TicketListView::new(self.ctx.clone(), self.scope)));
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
    let lookups = self.lookups.data().cloned().unwrap_or_default();

    let mut title = match self.query.state() {
      QueryState::Loading => format!(" {} (loading...) ", self.title()),
      QueryState::Error(e) => format!(" {} (error: {}) ", self.title(), e),
      _ => format!(" {} ", self.title()),
    };
    if self.query.data().is_some_and(|r| r.is_offline()) {
      title.push_str("[offline] ");
    }

    let chunks = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Length(34), Constraint::Min(20)])
      .split(area);

    let stats = DashboardStats::compute(self.tickets());
    let stats_block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.border));
    let paragraph = Paragraph::new(self.stat_lines(&stats, &lookups, palette)).block(stats_block);
    frame.render_widget(paragraph, chunks[0]);

    let recent_block = Block::default()
      .title(" Recently updated ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.border));

    let recent = recent(self.tickets());
    if recent.is_empty() {
      let content = if self.query.is_loading() {
        "Loading..."
      } else {
        "No tickets yet."
      };
      let empty = Paragraph::new(content)
        .block(recent_block)
        .style(Style::default().fg(palette.muted));
      frame.render_widget(empty, chunks[1]);
      return;
    }

    let items = ticket_items(&recent, &lookups, &self.ctx, palette);
    let len = items.len();
    let list = List::new(items)
      .block(recent_block)
      .highlight_style(Style::default().bg(palette.highlight).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");
    ensure_valid_selection(&mut self.list_state, len);
    frame.render_stateful_widget(list, chunks[1], &mut self.list_state);
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();
    self.lookups.poll();
    sync_from_cache(&mut self.query, &self.ctx.api, self.scope);
    ViewAction::None
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("enter", "open").with_priority(20),
      ShortcutInfo::new("t", "list").with_priority(30),
      ShortcutInfo::new("n", "new")
        .enabled_if(self.ctx.viewer.can(Permission::CreateTicket))
        .with_priority(40),
      ShortcutInfo::new("r", "refresh").with_priority(60),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ticket(id: i64, status_id: i64, priority_id: i64, assigned_to: Option<i64>, updated_at: &str) -> Ticket {
    Ticket {
      id,
      title: format!("ticket {}", id),
      body: String::new(),
      priority_id,
      status_id,
      created_by: 1,
      assigned_to,
      created_at: String::new(),
      updated_at: updated_at.to_string(),
      resolved_at: None,
    }
  }

  #[test]
  fn test_compute_counts_and_workload() {
    let tickets = vec![
      ticket(1, 1, 1, None, "2024-01-01"),
      ticket(2, 1, 2, Some(7), "2024-01-02"),
      ticket(3, 2, 2, Some(7), "2024-01-03"),
      ticket(4, 3, 3, Some(8), "2024-01-04"),
    ];

    let stats = DashboardStats::compute(&tickets);
    assert_eq!(stats.total, 4);
    assert_eq!(stats.by_status.get(&1), Some(&2));
    assert_eq!(stats.by_status.get(&3), Some(&1));
    assert_eq!(stats.by_priority.get(&2), Some(&2));
    assert_eq!(stats.unassigned, 1);
    assert_eq!(stats.workload, vec![(7, 2), (8, 1)]);
  }

  #[test]
  fn test_empty_dashboard() {
    let stats = DashboardStats::compute(&[]);
    assert_eq!(stats, DashboardStats::default());
  }

  #[test]
  fn test_scope_per_role() {
    assert_eq!(dashboard_scope(Role::Manager, 5), TicketScope::All);
    assert_eq!(dashboard_scope(Role::Support, 5), TicketScope::AssignedToMe);
    assert_eq!(dashboard_scope(Role::User, 5), TicketScope::CreatedBy(5));
  }

  #[test]
  fn test_recent_orders_by_update() {
    let tickets = vec![
      ticket(1, 1, 1, None, "2024-01-01T10:00:00Z"),
      ticket(2, 1, 1, None, "2024-03-01T10:00:00Z"),
      ticket(3, 1, 1, None, "2024-02-01T10:00:00Z"),
    ];
    let ids: Vec<i64> = recent(&tickets).into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);
  }
}
