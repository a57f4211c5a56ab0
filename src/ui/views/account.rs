use crate::api::{ProfileUpdate, UserInfo};
use crate::query::{Query, QueryState};
use crate::theme::Palette;
use crate::ui::centered_rect;
use crate::ui::components::{Form, FormEvent, KeyResult};
use crate::ui::context::AppContext;
use crate::ui::view::{Notice, ShortcutInfo, View, ViewAction};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

fn render_form_box(
  frame: &mut Frame,
  area: Rect,
  form: &Form,
  title: &str,
  status: Option<Line>,
  palette: &Palette,
) {
  let box_area = centered_rect(area, 60, form.height() + 4);
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Min(3), Constraint::Length(2)])
    .split(box_area);

  form.render(frame, chunks[0], title, palette);
  if let Some(line) = status {
    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), chunks[1]);
  }
}

fn form_status<'a, T>(
  submit: &Option<Query<T>>,
  error: &'a Option<String>,
  busy: &'a str,
  palette: &Palette,
) -> Option<Line<'a>> {
  if submit.as_ref().is_some_and(|q| q.is_loading()) {
    Some(Line::styled(busy, Style::default().fg(palette.muted)))
  } else {
    error
      .as_deref()
      .map(|e| Line::styled(e, Style::default().fg(palette.error)))
  }
}

/// Only the fields that differ from the current profile
pub fn profile_changes(current: &UserInfo, name: &str, email: &str) -> ProfileUpdate {
  let name = name.trim();
  let email = email.trim();
  ProfileUpdate {
    name: (name != current.name).then(|| name.to_string()),
    email: (email != current.email).then(|| email.to_string()),
  }
}

/// Edit name and email.
pub struct ProfileView {
  ctx: AppContext,
  form: Form,
  submit: Option<Query<UserInfo>>,
  error: Option<String>,
}

impl ProfileView {
  pub fn new(ctx: AppContext) -> Self {
    let form = Form::new()
      .field("Name")
      .prefilled(ctx.viewer.user.name.clone())
      .field("Email")
      .prefilled(ctx.viewer.user.email.clone());

    Self {
      ctx,
      form,
      submit: None,
      error: None,
    }
  }

  fn submit(&mut self) -> ViewAction {
    if let Some(label) = self.form.missing_required() {
      self.error = Some(format!("{} is required", label));
      return ViewAction::None;
    }

    let update = profile_changes(&self.ctx.viewer.user, self.form.value(0), self.form.value(1));
    if update.name.is_none() && update.email.is_none() {
      return ViewAction::Batch(vec![ViewAction::Pop, ViewAction::Notify(Notice::info("No changes"))]);
    }

    let api = self.ctx.api.clone();
    let mut query = Query::new(move || {
      let api = api.clone();
      let update = update.clone();
      async move { api.update_profile(&update).await.map_err(|e| e.to_string()) }
    });
    query.fetch();
    self.error = None;
    self.submit = Some(query);
    ViewAction::None
  }
}

impl View for ProfileView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.submit.as_ref().is_some_and(|q| q.is_loading()) {
      return ViewAction::None;
    }
    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted) => self.submit(),
      KeyResult::Event(FormEvent::Cancelled) => ViewAction::Pop,
      KeyResult::Handled | KeyResult::NotHandled => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let status = form_status(&self.submit, &self.error, "Saving...", palette);
    render_form_box(frame, area, &self.form, "Profile", status, palette);
  }

  fn breadcrumb_label(&self) -> String {
    "Profile".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    let Some(query) = &mut self.submit else {
      return ViewAction::None;
    };
    if !query.poll() {
      return ViewAction::None;
    }

    match query.state() {
      QueryState::Success(user) => ViewAction::Batch(vec![
        ViewAction::UserUpdated(user.clone()),
        ViewAction::Pop,
        ViewAction::Notify(Notice::info("Profile updated")),
      ]),
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
      ShortcutInfo::new("enter", "save").with_priority(20),
      ShortcutInfo::new("esc", "cancel").with_priority(90),
    ]
  }
}

/// Change the account password.
pub struct PasswordView {
  ctx: AppContext,
  form: Form,
  submit: Option<Query<Option<String>>>,
  error: Option<String>,
}

impl PasswordView {
  pub fn new(ctx: AppContext) -> Self {
    Self {
      ctx,
      form: Form::new()
        .masked("Current password")
        .masked("New password")
        .masked("Confirm"),
      submit: None,
      error: None,
    }
  }

  fn submit(&mut self) {
    if let Some(label) = self.form.missing_required() {
      self.error = Some(format!("{} is required", label));
      return;
    }
    if self.form.value(1) != self.form.value(2) {
      self.error = Some("Passwords do not match".to_string());
      return;
    }

    let api = self.ctx.api.clone();
    let current = self.form.value(0).to_string();
    let new = self.form.value(1).to_string();
    let mut query = Query::new(move || {
      let api = api.clone();
      let (current, new) = (current.clone(), new.clone());
      async move { api.update_password(&current, &new).await.map_err(|e| e.to_string()) }
    });
    query.fetch();
    self.error = None;
    self.submit = Some(query);
  }
}

impl View for PasswordView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.submit.as_ref().is_some_and(|q| q.is_loading()) {
      return ViewAction::None;
    }
    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted) => self.submit(),
      KeyResult::Event(FormEvent::Cancelled) => return ViewAction::Pop,
      KeyResult::Handled | KeyResult::NotHandled => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let status = form_status(&self.submit, &self.error, "Updating password...", palette);
    render_form_box(frame, area, &self.form, "Change password", status, palette);
  }

  fn breadcrumb_label(&self) -> String {
    "Password".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    let Some(query) = &mut self.submit else {
      return ViewAction::None;
    };
    if !query.poll() {
      return ViewAction::None;
    }

    match query.state() {
      QueryState::Success(message) => {
        let text = message.clone().unwrap_or_else(|| "Password updated".to_string());
        ViewAction::Batch(vec![ViewAction::Pop, ViewAction::Notify(Notice::info(text))])
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
      ShortcutInfo::new("enter", "update").with_priority(20),
      ShortcutInfo::new("esc", "cancel").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::roles::Role;

  fn user() -> UserInfo {
    UserInfo {
      id: 5,
      name: "Sam".into(),
      email: "sam@example.com".into(),
      roles: vec![Role::User],
      created_at: String::new(),
      updated_at: String::new(),
      profile_image: None,
    }
  }

  #[test]
  fn test_profile_changes_only_sends_edits() {
    let update = profile_changes(&user(), " Sam ", "sam@new.example.com");
    assert_eq!(update.name, None);
    assert_eq!(update.email.as_deref(), Some("sam@new.example.com"));
  }

  #[test]
  fn test_profile_changes_empty_when_untouched() {
    let update = profile_changes(&user(), "Sam", "sam@example.com");
    assert!(update.name.is_none());
    assert!(update.email.is_none());
  }

  #[tokio::test]
  async fn test_form_status_shows_busy_then_error() {
    let palette = Palette::for_mode(crate::theme::ThemeMode::Dark);
    let mut submit = Query::new(|| async {
      tokio::time::sleep(std::time::Duration::from_secs(5)).await;
      Ok::<_, String>(())
    });
    submit.fetch();
    let error = Some("Wrong password".to_string());

    let busy = form_status(&Some(submit), &error, "Saving...", &palette).unwrap();
    assert_eq!(busy.spans[0].content, "Saving...");

    let failed = form_status::<()>(&None, &error, "Saving...", &palette).unwrap();
    assert_eq!(failed.spans[0].content, "Wrong password");
    assert!(form_status::<()>(&None, &None, "Saving...", &palette).is_none());
  }
}
