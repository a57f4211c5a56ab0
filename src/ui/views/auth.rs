use crate::api::CachedTicketApi;
use crate::query::{Query, QueryState};
use crate::theme::Palette;
use crate::ui::centered_rect;
use crate::ui::components::{Form, FormEvent, KeyResult};
use crate::ui::view::{Notice, ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

const FORM_WIDTH: u16 = 56;

fn render_centered_form(
  frame: &mut Frame,
  area: Rect,
  form: &Form,
  title: &str,
  status: Option<Line>,
  palette: &Palette,
) {
  let box_area = centered_rect(area, FORM_WIDTH, form.height() + 2 + 2);
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Min(3), Constraint::Length(2)])
    .split(box_area);

  form.render(frame, chunks[0], title, palette);
  if let Some(line) = status {
    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), chunks[1]);
  }
}

/// Email/password sign-in.
///
/// On success the token store broadcasts `SignedIn`; the app reacts to that,
/// so this view only reports failures.
pub struct LoginView {
  api: CachedTicketApi,
  form: Form,
  submit: Option<Query<()>>,
  error: Option<String>,
  expired: bool,
}

impl LoginView {
  pub fn new(api: CachedTicketApi) -> Self {
    Self {
      api,
      form: Form::new().field("Email").masked("Password"),
      submit: None,
      error: None,
      expired: false,
    }
  }

  /// Shown after a failed token refresh
  pub fn expired(api: CachedTicketApi) -> Self {
    Self {
      expired: true,
      ..Self::new(api)
    }
  }

  fn is_submitting(&self) -> bool {
    self.submit.as_ref().is_some_and(|q| q.is_loading())
  }

  fn submit(&mut self) {
    if let Some(label) = self.form.missing_required() {
      self.error = Some(format!("{} is required", label));
      return;
    }

    let api = self.api.clone();
    let email = self.form.value(0).trim().to_string();
    let password = self.form.value(1).to_string();
    let mut query = Query::new(move || {
      let api = api.clone();
      let email = email.clone();
      let password = password.clone();
      async move { api.login(&email, &password).await.map_err(|e| e.to_string()) }
    });
    query.fetch();

    self.error = None;
    self.submit = Some(query);
  }
}

impl View for LoginView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.is_submitting() {
      return ViewAction::None;
    }

    if key.code == KeyCode::Char('r') && key.modifiers.contains(KeyModifiers::CONTROL) {
      return ViewAction::Replace(Box::new(RegisterView::new(self.api.clone())));
    }

    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted) => self.submit(),
      KeyResult::Event(FormEvent::Cancelled) => self.error = None,
      KeyResult::Handled | KeyResult::NotHandled => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let status = if self.is_submitting() {
      Some(Line::styled("Signing in...", Style::default().fg(palette.muted)))
    } else if let Some(error) = &self.error {
      Some(Line::styled(error.as_str(), Style::default().fg(palette.error)))
    } else if self.expired {
      Some(Line::styled(
        "Your session expired. Please sign in again.",
        Style::default().fg(palette.warning),
      ))
    } else {
      None
    };

    render_centered_form(frame, area, &self.form, "Sign in", status, palette);
  }

  fn breadcrumb_label(&self) -> String {
    "Sign in".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    if let Some(query) = &mut self.submit {
      if query.poll() {
        if let QueryState::Error(e) = query.state() {
          self.error = Some(e.clone());
          self.submit = None;
        }
      }
    }
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("tab", "next field").with_priority(10),
      ShortcutInfo::new("enter", "sign in").with_priority(20),
      ShortcutInfo::new("ctrl-r", "register").with_priority(30),
      ShortcutInfo::new("ctrl-c", "quit").with_priority(90),
    ]
  }
}

/// Account creation.
pub struct RegisterView {
  api: CachedTicketApi,
  form: Form,
  submit: Option<Query<bool>>,
  error: Option<String>,
}

impl RegisterView {
  pub fn new(api: CachedTicketApi) -> Self {
    Self {
      api,
      form: Form::new()
        .field("Name")
        .field("Email")
        .masked("Password")
        .masked("Confirm"),
      submit: None,
      error: None,
    }
  }

  fn is_submitting(&self) -> bool {
    self.submit.as_ref().is_some_and(|q| q.is_loading())
  }

  fn submit(&mut self) {
    if let Some(label) = self.form.missing_required() {
      self.error = Some(format!("{} is required", label));
      return;
    }
    if self.form.value(2) != self.form.value(3) {
      self.error = Some("Passwords do not match".to_string());
      return;
    }

    let api = self.api.clone();
    let name = self.form.value(0).trim().to_string();
    let email = self.form.value(1).trim().to_string();
    let password = self.form.value(2).to_string();
    let mut query = Query::new(move || {
      let api = api.clone();
      let (name, email, password) = (name.clone(), email.clone(), password.clone());
      async move {
        api
          .register(&name, &email, &password)
          .await
          .map_err(|e| e.to_string())
      }
    });
    query.fetch();

    self.error = None;
    self.submit = Some(query);
  }
}

impl View for RegisterView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.is_submitting() {
      return ViewAction::None;
    }

    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted) => self.submit(),
      KeyResult::Event(FormEvent::Cancelled) => {
        return ViewAction::Replace(Box::new(LoginView::new(self.api.clone())));
      }
      KeyResult::Handled | KeyResult::NotHandled => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let status = if self.is_submitting() {
      Some(Line::styled("Creating account...", Style::default().fg(palette.muted)))
    } else {
      self
        .error
        .as_deref()
        .map(|e| Line::styled(e, Style::default().fg(palette.error)))
    };

    render_centered_form(frame, area, &self.form, "Create account", status, palette);
  }

  fn breadcrumb_label(&self) -> String {
    "Register".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    let Some(query) = &mut self.submit else {
      return ViewAction::None;
    };
    if !query.poll() {
      return ViewAction::None;
    }

    match query.state() {
      QueryState::Error(e) => {
        self.error = Some(e.clone());
        self.submit = None;
        ViewAction::None
      }
      // Signed in as well; the session event takes over
      QueryState::Success(true) => ViewAction::None,
      QueryState::Success(false) => ViewAction::Batch(vec![
        ViewAction::Replace(Box::new(LoginView::new(self.api.clone()))),
        ViewAction::Notify(Notice::info("Account created. Please sign in.")),
      ]),
      _ => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("tab", "next field").with_priority(10),
      ShortcutInfo::new("enter", "create").with_priority(20),
      ShortcutInfo::new("esc", "back to sign in").with_priority(30),
    ]
  }
}
