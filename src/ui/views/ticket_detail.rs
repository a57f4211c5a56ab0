use crate::api::{CachedTicketApi, TicketDetail};
use crate::cache::CacheResult;
use crate::mutation::TicketPatch;
use crate::query::{Query, QueryState};
use crate::roles::Permission;
use crate::theme::Palette;
use crate::ui::components::{InputResult, KeyResult, OptionPicker, PickerEvent, TextInput};
use crate::ui::context::{AppContext, Lookups, Viewer};
use crate::ui::renderfns::format_timestamp;
use crate::ui::view::{Notice, ShortcutInfo, View, ViewAction};
use crate::ui::views::ticket_list::{lookups_query, priority_display_color, status_display_color};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// What the inline editor is writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditTarget {
  Body,
  Message,
}

impl EditTarget {
  fn title(self) -> &'static str {
    match self {
      EditTarget::Body => " Edit description (enter to save, esc to cancel) ",
      EditTarget::Message => " Reply (enter to send, esc to cancel) ",
    }
  }

  fn done(self) -> &'static str {
    match self {
      EditTarget::Body => "Description saved",
      EditTarget::Message => "Message sent",
    }
  }
}

/// Which optimistic patches the viewer may pick from, given the ticket and lookups.
fn assign_options(lookups: &Lookups, viewer: &Viewer) -> Vec<(String, TicketPatch)> {
  let mut options = vec![
    ("Unassigned".to_string(), TicketPatch::Assign(None)),
    (format!("{} (me)", viewer.user.name), TicketPatch::Assign(Some(viewer.user.id))),
  ];
  options.extend(
    lookups
      .agents
      .iter()
      .filter(|agent| agent.id != viewer.user.id)
      .map(|agent| (agent.name.clone(), TicketPatch::Assign(Some(agent.id)))),
  );
  options
}

/// Assignment a support agent gets from `a`: take the ticket, or let it go
fn self_assignment(assigned_to: Option<i64>, viewer: &Viewer) -> TicketPatch {
  if assigned_to == Some(viewer.user.id) {
    TicketPatch::Assign(None)
  } else {
    TicketPatch::Assign(Some(viewer.user.id))
  }
}

fn detail_query(api: &CachedTicketApi, id: i64) -> Query<CacheResult<TicketDetail>> {
  let api = api.clone();
  let first = std::sync::atomic::AtomicBool::new(true);
  Query::new(move || {
    let api = api.clone();
    let force = !first.swap(false, std::sync::atomic::Ordering::Relaxed);
    async move { api.ticket_detail(id, force).await.map_err(|e| e.to_string()) }
  })
}

/// One ticket with its conversation and the controls the role allows.
pub struct TicketDetailView {
  ctx: AppContext,
  id: i64,
  query: Query<CacheResult<TicketDetail>>,
  lookups: Query<Lookups>,
  picker: OptionPicker<TicketPatch>,
  editor: Option<(EditTarget, TextInput)>,
  save: Option<(EditTarget, Query<()>)>,
  scroll: u16,
}

impl TicketDetailView {
  pub fn new(ctx: AppContext, id: i64) -> Self {
    let mut query = detail_query(&ctx.api, id);
    query.fetch();
    let mut lookups = lookups_query(&ctx);
    lookups.fetch();

    Self {
      ctx,
      id,
      query,
      lookups,
      picker: OptionPicker::new(),
      editor: None,
      save: None,
      scroll: 0,
    }
  }

  fn detail(&self) -> Option<&TicketDetail> {
    self.query.data().map(|r| &r.data)
  }

  fn lookup_data(&self) -> Lookups {
    self.lookups.data().cloned().unwrap_or_default()
  }

  fn is_pending(&self) -> bool {
    self.ctx.mutations.is_pending(self.id)
  }

  fn is_saving(&self) -> bool {
    self.save.as_ref().is_some_and(|(_, q)| q.is_loading())
  }

  fn mutate(&mut self, patch: TicketPatch) -> ViewAction {
    match self.ctx.mutate(self.id, patch) {
      Ok(()) => ViewAction::None,
      Err(e) => ViewAction::Notify(Notice::error(e.to_string())),
    }
  }

  /// Open a picker for a mutation control, or explain why it is unavailable
  fn open_picker(&mut self, key: char) -> ViewAction {
    if self.is_pending() {
      return ViewAction::Notify(Notice::error(format!("Ticket #{} is still being updated", self.id)));
    }
    let Some(ticket) = self.detail().map(|d| d.ticket.clone()) else {
      return ViewAction::None;
    };
    let lookups = self.lookup_data();
    let viewer = &self.ctx.viewer;

    match key {
      's' if viewer.can(Permission::ChangeStatus) => {
        let options = lookups
          .statuses
          .iter()
          .map(|s| (s.name.clone(), TicketPatch::Status(s.id)))
          .collect();
        self.picker.show("Status", options, Some(&TicketPatch::Status(ticket.status_id)));
      }
      'p' if viewer.can(Permission::ChangePriority) => {
        let options = lookups
          .priorities
          .iter()
          .map(|p| (p.name.clone(), TicketPatch::Priority(p.id)))
          .collect();
        self.picker.show("Priority", options, Some(&TicketPatch::Priority(ticket.priority_id)));
      }
      'a' if viewer.can(Permission::AssignOthers) => {
        let options = assign_options(&lookups, viewer);
        self.picker.show("Assignee", options, Some(&TicketPatch::Assign(ticket.assigned_to)));
      }
      'a' if viewer.can(Permission::AssignSelf) => {
        let patch = self_assignment(ticket.assigned_to, viewer);
        return self.mutate(patch);
      }
      _ => {
        return ViewAction::Notify(Notice::error(format!(
          "Not available for the {} role",
          viewer.role
        )));
      }
    }
    ViewAction::None
  }

  fn start_edit(&mut self, target: EditTarget) -> ViewAction {
    if self.is_saving() {
      return ViewAction::None;
    }
    let input = match target {
      EditTarget::Body => match self.detail() {
        Some(detail) => TextInput::with_value(detail.ticket.body.clone()),
        None => return ViewAction::None,
      },
      EditTarget::Message => {
        if !self.ctx.viewer.can(Permission::PostMessage) {
          return ViewAction::Notify(Notice::error("Sign in to reply"));
        }
        TextInput::new()
      }
    };
    self.editor = Some((target, input));
    ViewAction::None
  }

  fn submit_edit(&mut self, target: EditTarget, text: String) -> ViewAction {
    if text.trim().is_empty() {
      return ViewAction::Notify(Notice::error("Nothing to save"));
    }

    let api = self.ctx.api.clone();
    let id = self.id;
    let mut query = Query::new(move || {
      let api = api.clone();
      let text = text.clone();
      async move {
        match target {
          EditTarget::Body => api.patch_body(id, &text).await.map(|_| ()),
          EditTarget::Message => api.post_message(id, &text).await.map(|_| ()),
        }
        .map_err(|e| e.to_string())
      }
    });
    query.fetch();
    self.save = Some((target, query));
    ViewAction::None
  }

  fn handle_editor_key(&mut self, key: KeyEvent) -> ViewAction {
    let Some((target, input)) = &mut self.editor else {
      return ViewAction::None;
    };
    let target = *target;
    match input.handle_key(key) {
      InputResult::Submitted(text) => {
        self.editor = None;
        self.submit_edit(target, text)
      }
      InputResult::Cancelled => {
        self.editor = None;
        ViewAction::None
      }
      InputResult::Consumed | InputResult::NotHandled => ViewAction::None,
    }
  }

  fn sync_from_cache(&mut self) {
    if self.query.is_loading() {
      return;
    }
    let (Some(current), Some(cached)) = (self.query.data(), self.ctx.api.peek_detail(self.id)) else {
      return;
    };
    if current.data != cached {
      let next = CacheResult {
        data: cached,
        source: current.source,
        cached_at: current.cached_at,
      };
      self.query.set_data(next);
    }
  }

  fn header_lines(&self, detail: &TicketDetail, lookups: &Lookups, palette: &Palette) -> Vec<Line<'static>> {
    let ticket = &detail.ticket;
    let viewer = &self.ctx.viewer;
    let label = |text: &'static str| Span::styled(format!("{:<11}", text), Style::default().fg(palette.muted));

    let mut status_line = vec![
      label("Status"),
      Span::styled(
        lookups.status_name(ticket.status_id),
        Style::default().fg(status_display_color(lookups, ticket.status_id, palette)).bold(),
      ),
      Span::raw("   "),
      label("Priority"),
      Span::styled(
        lookups.priority_name(ticket.priority_id),
        Style::default().fg(priority_display_color(lookups, ticket.priority_id, palette)),
      ),
    ];
    if self.is_pending() {
      status_line.push(Span::styled("   saving...", Style::default().fg(palette.warning)));
    }

    let mut lines = vec![
      Line::from(Span::styled(ticket.title.clone(), Style::default().fg(palette.fg).bold())),
      Line::from(status_line),
      Line::from(vec![
        label("Assignee"),
        Span::styled(lookups.assignee_label(ticket.assigned_to, viewer), Style::default().fg(palette.fg)),
        Span::raw("   "),
        label("Opened by"),
        Span::styled(lookups.user_name(ticket.created_by, viewer), Style::default().fg(palette.fg)),
      ]),
      Line::from(vec![
        label("Created"),
        Span::styled(format_timestamp(&ticket.created_at), Style::default().fg(palette.fg)),
        Span::raw("   "),
        label("Updated"),
        Span::styled(format_timestamp(&ticket.updated_at), Style::default().fg(palette.fg)),
      ]),
    ];
    if let Some(resolved) = &ticket.resolved_at {
      lines.push(Line::from(vec![
        label("Resolved"),
        Span::styled(format_timestamp(resolved), Style::default().fg(palette.success)),
      ]));
    }
    lines
  }

  fn conversation_lines(&self, detail: &TicketDetail, lookups: &Lookups, palette: &Palette) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = detail
      .ticket
      .body
      .lines()
      .map(|l| Line::styled(l.to_string(), Style::default().fg(palette.fg)))
      .collect();

    lines.push(Line::default());
    lines.push(Line::styled(
      format!("Messages ({})", detail.messages.len()),
      Style::default().fg(palette.accent).bold(),
    ));

    if detail.messages.is_empty() {
      lines.push(Line::styled("No messages yet.", Style::default().fg(palette.muted)));
    }
    for message in &detail.messages {
      let mine = message.sender_id == self.ctx.viewer.user.id;
      let author_color = if mine { palette.accent } else { palette.warning };
      lines.push(Line::default());
      lines.push(Line::from(vec![
        Span::styled(
          lookups.user_name(message.sender_id, &self.ctx.viewer),
          Style::default().fg(author_color).bold(),
        ),
        Span::styled(
          format!("  {}", format_timestamp(&message.created_at)),
          Style::default().fg(palette.muted),
        ),
      ]));
      for line in message.body.lines() {
        lines.push(Line::styled(format!("  {}", line), Style::default().fg(palette.fg)));
      }
    }
    lines
  }

  fn render_editor(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let Some((target, input)) = &self.editor else {
      return;
    };
    let block = Block::default()
      .title(target.title())
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.warning));
    let line = Line::from(vec![
      Span::styled(input.value().to_string(), Style::default().fg(palette.fg)),
      Span::styled("_", Style::default().fg(palette.warning)),
    ]);
    frame.render_widget(Paragraph::new(line).block(block).wrap(Wrap { trim: false }), area);
  }
}

impl View for TicketDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.editor.is_some() {
      return self.handle_editor_key(key);
    }

    match self.picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(patch)) => return self.mutate(patch),
      KeyResult::Event(PickerEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char(c @ ('s' | 'p' | 'a')) => return self.open_picker(c),
      KeyCode::Char('e') => return self.start_edit(EditTarget::Body),
      KeyCode::Char('m') => return self.start_edit(EditTarget::Message),
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('g') | KeyCode::Home => self.scroll = 0,
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let title = match self.query.state() {
      QueryState::Loading => format!(" #{} (loading...) ", self.id),
      QueryState::Error(e) => format!(" #{} (error: {}) ", self.id, e),
      _ if self.query.data().is_some_and(|r| r.is_offline()) => format!(" #{} [offline] ", self.id),
      _ => format!(" #{} ", self.id),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.border));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(detail) = self.detail().cloned() else {
      let paragraph = match self.query.error() {
        Some(error) => Paragraph::new(format!("Error: {}\n\nPress 'r' to retry.", error))
          .style(Style::default().fg(palette.error)),
        None => Paragraph::new("Loading ticket...").style(Style::default().fg(palette.muted)),
      };
      frame.render_widget(paragraph, inner);
      return;
    };
    let lookups = self.lookup_data();

    let header = self.header_lines(&detail, &lookups, palette);
    let editor_height = if self.editor.is_some() { 3 } else { 0 };
    let saving_height = if self.is_saving() { 1 } else { 0 };
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(header.len() as u16),
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(saving_height),
        Constraint::Length(editor_height),
      ])
      .split(inner);

    frame.render_widget(Paragraph::new(header), chunks[0]);
    frame.render_widget(
      Paragraph::new("─".repeat(chunks[1].width as usize)).style(Style::default().fg(palette.muted)),
      chunks[1],
    );

    let conversation = Paragraph::new(self.conversation_lines(&detail, &lookups, palette))
      .wrap(Wrap { trim: false })
      .scroll((self.scroll, 0));
    frame.render_widget(conversation, chunks[2]);

    if let Some((target, _)) = &self.save {
      let text = match target {
        EditTarget::Body => "Saving description...",
        EditTarget::Message => "Sending message...",
      };
      frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(palette.muted)),
        chunks[3],
      );
    }
    self.render_editor(frame, chunks[4], palette);
    self.picker.render_overlay(frame, area, palette);
  }

  fn breadcrumb_label(&self) -> String {
    format!("#{}", self.id)
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();
    self.lookups.poll();

    let mut action = ViewAction::None;
    if let Some((target, query)) = &mut self.save {
      if query.poll() {
        action = match query.state() {
          QueryState::Error(e) => ViewAction::Notify(Notice::error(e.clone())),
          _ => ViewAction::Notify(Notice::info(target.done())),
        };
        self.save = None;
      }
    }

    self.sync_from_cache();
    action
  }

  fn captures_input(&self) -> bool {
    self.editor.is_some()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let viewer = &self.ctx.viewer;
    let idle = !self.is_pending();
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("s", "status")
        .enabled_if(idle && viewer.can(Permission::ChangeStatus))
        .with_priority(20),
      ShortcutInfo::new("p", "priority")
        .enabled_if(idle && viewer.can(Permission::ChangePriority))
        .with_priority(21),
      ShortcutInfo::new("a", "assign")
        .enabled_if(idle && viewer.can(Permission::AssignSelf))
        .with_priority(22),
      ShortcutInfo::new("e", "edit").with_priority(30),
      ShortcutInfo::new("m", "reply")
        .enabled_if(viewer.can(Permission::PostMessage))
        .with_priority(31),
      ShortcutInfo::new("r", "refresh").with_priority(60),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
