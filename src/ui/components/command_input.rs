use super::input::{InputResult, TextInput};
use super::prompt::draw_prompt;
use super::KeyResult;
use crate::commands::{self, Command, CommandId};
use crate::theme::Palette;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState};

const MAX_SUGGESTIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
  Run(CommandId),
  /// Enter on text that matches nothing
  Unknown(String),
  Cancelled,
}

/// The `:` palette: a text line plus a ranked suggestion list.
#[derive(Debug, Clone, Default)]
pub struct CommandInput {
  input: TextInput,
  active: bool,
  selected: usize,
}

impl CommandInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn activate(&mut self) {
    *self = Self {
      active: true,
      ..Self::default()
    };
  }

  fn close(&mut self) {
    *self = Self::default();
  }

  pub fn suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(self.input.value())
  }

  fn step(&mut self, forward: bool) {
    let count = self.suggestions().len();
    if count == 0 {
      return;
    }
    self.selected = if forward {
      (self.selected + 1) % count
    } else {
      (self.selected + count - 1) % count
    };
  }

  /// `:` opens the palette; while open it owns every key.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<CommandEvent> {
    if !self.active {
      if key.code == KeyCode::Char(':') {
        self.activate();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Esc => {
        self.close();
        KeyResult::Event(CommandEvent::Cancelled)
      }
      KeyCode::Enter => {
        let event = match self.suggestions().get(self.selected) {
          Some(cmd) => CommandEvent::Run(cmd.id),
          None => CommandEvent::Unknown(self.input.value().trim().to_string()),
        };
        self.close();
        KeyResult::Event(event)
      }
      KeyCode::Tab | KeyCode::Down => {
        self.step(true);
        KeyResult::Handled
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.step(false);
        KeyResult::Handled
      }
      _ => {
        if let InputResult::Consumed = self.input.handle_key(key) {
          self.selected = 0;
        }
        KeyResult::Handled
      }
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    if !self.active {
      return;
    }

    let suggestions = self.suggestions();
    let shown = suggestions.len().min(MAX_SUGGESTIONS);
    let prompt = draw_prompt(frame, area, "Command", ":", &self.input, shown as u16, palette);
    let Some(list_area) = prompt else {
      return;
    };
    if shown == 0 {
      return;
    }

    let items: Vec<ListItem> = suggestions
      .iter()
      .take(shown)
      .map(|cmd| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<12}", cmd.name), Style::default().fg(palette.accent)),
          Span::styled(cmd.description, Style::default().fg(palette.muted)),
        ]))
      })
      .collect();
    let list = List::new(items).highlight_style(Style::default().bg(palette.highlight).fg(palette.fg));
    let mut state = ListState::default().with_selected(Some(self.selected));
    frame.render_stateful_widget(list, list_area, &mut state);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_text(command: &mut CommandInput, text: &str) {
    for c in text.chars() {
      command.handle_key(key(KeyCode::Char(c)));
    }
  }

  #[test]
  fn test_colon_opens_and_enter_runs_best_match() {
    let mut command = CommandInput::new();
    assert_eq!(command.handle_key(key(KeyCode::Char('x'))), KeyResult::NotHandled);
    assert_eq!(command.handle_key(key(KeyCode::Char(':'))), KeyResult::Handled);
    type_text(&mut command, "m");
    assert_eq!(
      command.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(CommandEvent::Run(CommandId::Mine))
    );
    assert!(!command.is_active());
  }

  #[test]
  fn test_tab_and_backtab_wrap() {
    let mut command = CommandInput::new();
    command.activate();
    command.handle_key(key(KeyCode::BackTab));
    let last = command.suggestions().last().map(|c| c.id);
    assert_eq!(
      command.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(CommandEvent::Run(last.unwrap()))
    );
  }

  #[test]
  fn test_unmatched_text_is_reported() {
    let mut command = CommandInput::new();
    command.activate();
    type_text(&mut command, "zzz");
    assert_eq!(
      command.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(CommandEvent::Unknown("zzz".into()))
    );
  }

  #[test]
  fn test_escape_closes() {
    let mut command = CommandInput::new();
    command.activate();
    type_text(&mut command, "ti");
    assert_eq!(command.handle_key(key(KeyCode::Esc)), KeyResult::Event(CommandEvent::Cancelled));
    assert!(!command.is_active());
    assert!(command.suggestions().len() > 1);
  }
}
