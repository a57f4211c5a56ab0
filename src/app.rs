use crate::api::{CachedTicketApi, UserInfo};
use crate::cache::CacheResult;
use crate::commands::CommandId;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::mutation::OptimisticUpdater;
use crate::prefs::Preferences;
use crate::query::{Query, QueryState};
use crate::roles::{resolve_active_role, Permission, Role};
use crate::session::SessionEvent;
use crate::theme::{Palette, ThemeMode};
use crate::ui::components::{CommandEvent, CommandInput, KeyResult, OptionPicker, PickerEvent};
use crate::ui::context::{AppContext, MutationTracker, Viewer};
use crate::ui::renderfns::{draw_footer, draw_header, HeaderInfo};
use crate::ui::view::{Notice, View, ViewAction};
use crate::ui::views::{
  CreateTicketView, DashboardView, LoginView, PasswordView, ProfileView, TicketListView,
  TicketScope,
};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Paragraph};
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

const TICK_RATE: Duration = Duration::from_millis(100);
const NOTICE_TTL: Duration = Duration::from_secs(5);

/// Main application state
pub struct App {
  config: Config,
  api: CachedTicketApi,
  mutations: Arc<OptimisticUpdater>,
  tracker: MutationTracker,
  prefs: Preferences,
  /// Role asked for on the command line or in the config file
  requested_role: Option<Role>,

  session_events: broadcast::Receiver<SessionEvent>,
  me: Option<Query<CacheResult<UserInfo>>>,
  /// Re-reads the account after the token pair changed under us
  identity: Option<Query<UserInfo>>,
  viewer: Option<Viewer>,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,
  command_input: CommandInput,
  role_picker: OptionPicker<Role>,

  theme: ThemeMode,
  notice: Option<(Notice, Instant)>,
  should_quit: bool,
}

impl App {
  pub fn new(
    config: Config,
    api: CachedTicketApi,
    mutations: Arc<OptimisticUpdater>,
    prefs: Preferences,
    requested_role: Option<Role>,
  ) -> Self {
    let session_events = api.tokens().subscribe();
    let theme = prefs.theme();
    let requested_role = requested_role.or_else(|| config.default_role());

    let mut app = Self {
      config,
      api,
      mutations,
      tracker: MutationTracker::new(),
      prefs,
      requested_role,
      session_events,
      me: None,
      identity: None,
      viewer: None,
      view_stack: Vec::new(),
      command_input: CommandInput::new(),
      role_picker: OptionPicker::new(),
      theme,
      notice: None,
      should_quit: false,
    };

    if app.api.tokens().is_authenticated() {
      app.load_me();
    } else {
      app.show_login(None);
    }
    app
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(TICK_RATE);

    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      if let Some(event) = events.next().await {
        self.handle_event(event);
      }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Resize => {}
      Event::Tick => self.tick(),
    }
  }

  fn tick(&mut self) {
    self.drain_session_events();
    self.poll_me();
    self.poll_identity();

    for notice in self.tracker.poll() {
      self.notify(notice);
    }

    if let Some(view) = self.view_stack.last_mut() {
      let action = view.tick();
      self.apply_action(action);
    }

    if self
      .notice
      .as_ref()
      .is_some_and(|(_, shown)| shown.elapsed() > NOTICE_TTL)
    {
      self.notice = None;
    }
  }

  fn drain_session_events(&mut self) {
    loop {
      match self.session_events.try_recv() {
        Ok(event) => self.handle_session_event(event),
        Err(TryRecvError::Lagged(skipped)) => {
          debug!(skipped, "Session events lagged");
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
      }
    }
  }

  fn handle_session_event(&mut self, event: SessionEvent) {
    info!(?event, "Session event");
    match event {
      SessionEvent::SignedIn => {
        self.api.reset_cache();
        self.load_me();
      }
      SessionEvent::TokensChanged => {
        if !self.api.tokens().is_authenticated() {
          return;
        }
        if self.viewer.is_some() {
          self.verify_identity();
        } else if self.me.is_none() {
          self.load_me();
        }
      }
      SessionEvent::SignedOut => {
        self.end_session();
        self.show_login(Some(Notice::info("Signed out")));
      }
      SessionEvent::Expired => {
        self.end_session();
        self.view_stack = vec![Box::new(LoginView::expired(self.api.clone()))];
        self.notify(Notice::error("Session expired"));
      }
    }
  }

  fn end_session(&mut self) {
    self.api.reset_cache();
    self.viewer = None;
    self.me = None;
    self.identity = None;
    self.role_picker.hide();
  }

  fn show_login(&mut self, notice: Option<Notice>) {
    self.view_stack = vec![Box::new(LoginView::new(self.api.clone()))];
    if let Some(notice) = notice {
      self.notify(notice);
    }
  }

  fn load_me(&mut self) {
    let api = self.api.clone();
    let mut query = Query::new(move || {
      let api = api.clone();
      async move { api.me().await.map_err(|e| e.to_string()) }
    });
    query.fetch();
    self.me = Some(query);
    self.view_stack.clear();
  }

  fn poll_me(&mut self) {
    let Some(query) = &mut self.me else {
      return;
    };
    if !query.poll() {
      return;
    }

    match query.state() {
      QueryState::Success(result) => {
        let user = result.data.clone();
        self.me = None;
        self.sign_in_as(user);
      }
      QueryState::Error(e) => {
        warn!(error = %e, "Failed to load current user");
        let message = format!("Could not load your account: {}", e);
        self.me = None;
        // A failed refresh has already moved us to the login screen
        if self.view_stack.is_empty() {
          self.show_login(Some(Notice::error(message)));
        }
      }
      _ => {}
    }
  }

  /// The new pair may belong to another account (logout and login elsewhere
  /// between two storage polls), so ask the backend who we are now.
  fn verify_identity(&mut self) {
    let api = self.api.clone();
    let query = self.identity.get_or_insert_with(|| {
      Query::new(move || {
        let api = api.clone();
        async move { api.api().me().await.map_err(|e| e.to_string()) }
      })
    });
    query.refetch();
  }

  fn poll_identity(&mut self) {
    let Some(query) = &mut self.identity else {
      return;
    };
    if !query.poll() {
      return;
    }

    match query.state().clone() {
      QueryState::Success(user) => {
        self.identity = None;
        self.reconcile_identity(user);
      }
      QueryState::Error(e) => {
        self.identity = None;
        debug!(error = %e, "Could not re-check the account after a token change");
      }
      _ => {}
    }
  }

  fn reconcile_identity(&mut self, user: UserInfo) {
    let Some(viewer) = &mut self.viewer else {
      return;
    };
    if viewer.user.id == user.id {
      viewer.user = user;
      return;
    }

    info!(from = viewer.user.id, to = user.id, "Account switched in another instance");
    let name = user.name.clone();
    self.api.reset_cache();
    self.role_picker.hide();
    self.sign_in_as(user);
    self.notify(Notice::info(format!("Now signed in as {}", name)));
  }

  fn sign_in_as(&mut self, user: UserInfo) {
    let requested = self.prefs.active_role().or(self.requested_role);
    let role = resolve_active_role(&user.roles, requested);
    self.prefs.set_active_role(role);
    info!(user = user.id, %role, "Signed in");

    self.viewer = Some(Viewer { user, role });
    self.show_dashboard();
  }

  fn context(&self) -> Option<AppContext> {
    let viewer = self.viewer.clone()?;
    Some(AppContext {
      api: self.api.clone(),
      mutations: self.mutations.clone(),
      tracker: self.tracker.clone(),
      viewer,
      search_debounce: self.config.search_debounce(),
    })
  }

  fn show_dashboard(&mut self) {
    if let Some(ctx) = self.context() {
      self.view_stack = vec![Box::new(DashboardView::new(ctx))];
    }
  }

  fn switch_role(&mut self, role: Role) {
    let Some(viewer) = &mut self.viewer else {
      return;
    };
    if viewer.role == role {
      return;
    }
    viewer.role = role;
    self.prefs.set_active_role(role);
    self.show_dashboard();
    self.notify(Notice::info(format!("Acting as {}", role.label())));
  }

  fn notify(&mut self, notice: Notice) {
    self.notice = Some((notice, Instant::now()));
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    match self.role_picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(role)) => return self.switch_role(role),
      KeyResult::Event(PickerEvent::Cancelled) | KeyResult::Handled => return,
      KeyResult::NotHandled => {}
    }

    let captures = self.view_stack.last().is_some_and(|v| v.captures_input());
    if self.command_input.is_active() || !captures {
      match self.command_input.handle_key(key) {
        KeyResult::Event(CommandEvent::Run(id)) => return self.execute_command(id),
        KeyResult::Event(CommandEvent::Unknown(text)) => {
          return self.notify(Notice::error(format!("Unknown command: {}", text)));
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    if let Some(view) = self.view_stack.last_mut() {
      let action = view.handle_key(key);
      self.apply_action(action);
    }
  }

  fn apply_action(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::Replace(view) => {
        self.view_stack.pop();
        self.view_stack.push(view);
      }
      ViewAction::Notify(notice) => self.notify(notice),
      ViewAction::UserUpdated(user) => {
        if let Some(viewer) = &mut self.viewer {
          viewer.user = user;
        }
      }
      ViewAction::Batch(actions) => {
        for action in actions {
          self.apply_action(action);
        }
      }
    }
  }

  fn execute_command(&mut self, id: CommandId) {
    debug!(?id, "Executing command");
    // Available before sign-in too
    match id {
      CommandId::Quit => {
        self.should_quit = true;
        return;
      }
      CommandId::Theme => {
        self.theme = self.theme.toggled();
        self.prefs.set_theme(self.theme);
        return;
      }
      _ => {}
    }
    let Some(ctx) = self.context() else {
      return;
    };
    let role = ctx.viewer.role;

    match id {
      CommandId::Dashboard => self.show_dashboard(),
      CommandId::Tickets => {
        let scope = TicketScope::for_role(role, ctx.viewer.user.id);
        self.view_stack = vec![Box::new(TicketListView::new(ctx, scope))];
      }
      CommandId::Mine => {
        if role.can(Permission::AssignSelf) {
          self.view_stack = vec![Box::new(TicketListView::new(ctx, TicketScope::AssignedToMe))];
        } else {
          self.notify(Notice::error("Only support staff have assigned tickets"));
        }
      }
      CommandId::New => {
        if ctx.viewer.can(Permission::CreateTicket) {
          self.view_stack.push(Box::new(CreateTicketView::new(ctx)));
        } else {
          self.notify(Notice::error(format!("The {} role cannot open tickets", role.label())));
        }
      }
      CommandId::Profile => self.view_stack.push(Box::new(ProfileView::new(ctx))),
      CommandId::Password => self.view_stack.push(Box::new(PasswordView::new(ctx))),
      CommandId::Role => {
        let held = &ctx.viewer.user.roles;
        if held.len() > 1 {
          let options = held.iter().map(|r| (r.label().to_string(), *r)).collect();
          self.role_picker.show("Act as", options, Some(&role));
        } else {
          self.notify(Notice::info(format!("{} is your only role", role.label())));
        }
      }
      CommandId::Logout => {
        let api = self.api.clone();
        tokio::spawn(async move { api.logout().await });
      }
      CommandId::Quit | CommandId::Theme => {}
    }
  }

  fn breadcrumb(&self) -> Vec<String> {
    self.view_stack.iter().map(|v| v.breadcrumb_label()).collect()
  }

  fn draw(&mut self, frame: &mut Frame) {
    let palette = Palette::for_mode(self.theme);
    let area = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(palette.bg)), area);

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
      ])
      .split(area);

    let shortcuts = self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default();
    let base_url = self.api.api().base_url().to_string();
    let header = HeaderInfo {
      title: self.config.title.as_deref().unwrap_or("ticketdesk"),
      base_url: &base_url,
      user: self
        .viewer
        .as_ref()
        .map(|v| format!("{} ({})", v.user.name, v.role.label())),
      theme: self.theme,
    };
    draw_header(frame, chunks[0], &header, &shortcuts, &palette);

    match self.view_stack.last_mut() {
      Some(view) => view.render(frame, chunks[1], &palette),
      None => {
        let loading = Paragraph::new("Signing in...")
          .alignment(Alignment::Center)
          .style(Style::default().fg(palette.muted));
        frame.render_widget(loading, chunks[1]);
      }
    }

    let notice = self.notice.as_ref().map(|(n, _)| n);
    draw_footer(frame, chunks[2], &self.breadcrumb(), notice, &palette);

    self.command_input.render_overlay(frame, area, &palette);
    self.role_picker.render_overlay(frame, area, &palette);
  }
}
