use crate::api::{NewTicket, Priority, Ticket};
use crate::query::{Query, QueryState};
use crate::theme::Palette;
use crate::ui::centered_rect;
use crate::ui::components::{Form, FormEvent, KeyResult, OptionPicker, PickerEvent};
use crate::ui::context::{AppContext, Lookups};
use crate::ui::view::{Notice, ShortcutInfo, View, ViewAction};
use crate::ui::views::ticket_list::lookups_query;
use crate::ui::views::TicketDetailView;
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Lowest level first, so the picker opens on the least urgent choice
fn priority_options(priorities: &[Priority]) -> Vec<(String, i64)> {
  let mut sorted: Vec<&Priority> = priorities.iter().collect();
  sorted.sort_by_key(|p| p.level);
  sorted.into_iter().map(|p| (p.name.clone(), p.id)).collect()
}

/// Title and description, then a priority, then POST.
pub struct CreateTicketView {
  ctx: AppContext,
  form: Form,
  lookups: Query<Lookups>,
  picker: OptionPicker<i64>,
  submit: Option<Query<Ticket>>,
  error: Option<String>,
}

impl CreateTicketView {
  pub fn new(ctx: AppContext) -> Self {
    let mut lookups = lookups_query(&ctx);
    lookups.fetch();

    Self {
      ctx,
      form: Form::new().field("Title").field("Description"),
      lookups,
      picker: OptionPicker::new(),
      submit: None,
      error: None,
    }
  }

  fn is_submitting(&self) -> bool {
    self.submit.as_ref().is_some_and(|q| q.is_loading())
  }

  fn choose_priority(&mut self) {
    if let Some(label) = self.form.missing_required() {
      self.error = Some(format!("{} is required", label));
      return;
    }
    let Some(lookups) = self.lookups.data() else {
      self.error = Some("Still loading priorities...".to_string());
      return;
    };
    let options = priority_options(&lookups.priorities);
    if options.is_empty() {
      self.error = Some("No priorities available".to_string());
      return;
    }
    self.error = None;
    self.picker.show("Priority", options, None);
  }

  fn create(&mut self, priority_id: i64) {
    let ticket = NewTicket {
      title: self.form.value(0).trim().to_string(),
      body: self.form.value(1).trim().to_string(),
      priority_id,
    };
    let api = self.ctx.api.clone();
    let mut query = Query::new(move || {
      let api = api.clone();
      let ticket = ticket.clone();
      async move { api.create_ticket(&ticket).await.map_err(|e| e.to_string()) }
    });
    query.fetch();
    self.submit = Some(query);
  }
}

impl View for CreateTicketView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.is_submitting() {
      return ViewAction::None;
    }

    match self.picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(priority_id)) => {
        self.create(priority_id);
        return ViewAction::None;
      }
      KeyResult::Event(PickerEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted) => self.choose_priority(),
      KeyResult::Event(FormEvent::Cancelled) => return ViewAction::Pop,
      KeyResult::Handled | KeyResult::NotHandled => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let box_area = centered_rect(area, 72, self.form.height() + 4);
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(3), Constraint::Length(2)])
      .split(box_area);

    self.form.render(frame, chunks[0], "New ticket", palette);

    let status = if self.is_submitting() {
      Some(Line::styled("Creating ticket...", Style::default().fg(palette.muted)))
    } else {
      self
        .error
        .as_deref()
        .map(|e| Line::styled(e, Style::default().fg(palette.error)))
    };
    if let Some(line) = status {
      frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), chunks[1]);
    }

    self.picker.render_overlay(frame, area, palette);
  }

  fn breadcrumb_label(&self) -> String {
    "New ticket".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.lookups.poll();

    let Some(query) = &mut self.submit else {
      return ViewAction::None;
    };
    if !query.poll() {
      return ViewAction::None;
    }

    match query.state() {
      QueryState::Success(ticket) => {
        let id = ticket.id;
        ViewAction::Batch(vec![
          ViewAction::Replace(Box::new(TicketDetailView::new(self.ctx.clone(), id))),
          ViewAction::Notify(Notice::info(format!("Ticket #{} created", id))),
        ])
      }
      QueryState::Error(e) => {
        self.error = Some(e.clone());
        self.submit = None;
        ViewAction::None
      }
      _ => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("tab", "next field").with_priority(10),
      ShortcutInfo::new("enter", "continue").with_priority(20),
      ShortcutInfo::new("esc", "cancel").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn priority(id: i64, name: &str, level: i64) -> Priority {
    Priority {
      id,
      name: name.to_string(),
      level,
      description: String::new(),
      color: String::new(),
    }
  }

  #[test]
  fn test_priority_options_sorted_by_level() {
    let priorities = vec![
      priority(3, "High", 3),
      priority(1, "Low", 1),
      priority(2, "Medium", 2),
    ];
    let options = priority_options(&priorities);
    let ids: Vec<i64> = options.iter().map(|(_, id)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(options[0].0, "Low");
  }
}
