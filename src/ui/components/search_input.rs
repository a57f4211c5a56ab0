use super::input::{InputResult, TextInput};
use super::prompt::draw_prompt;
use super::KeyResult;
use crate::theme::Palette;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
  /// The text changed; empty after escape
  Changed(String),
  /// Enter closed the prompt, the text stays applied
  Submitted,
}

/// `/` search prompt. Each keystroke is reported; the owner decides when
/// to apply it (the ticket list debounces).
#[derive(Debug, Clone, Default)]
pub struct SearchInput {
  input: TextInput,
  active: bool,
}

impl SearchInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn query(&self) -> &str {
    self.input.value()
  }

  /// Reopen the prompt with the previous text still in it
  pub fn activate(&mut self) {
    self.active = true;
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<SearchEvent> {
    if !self.active {
      return if key.code == KeyCode::Char('/') {
        self.activate();
        KeyResult::Handled
      } else {
        KeyResult::NotHandled
      };
    }

    let event = match self.input.handle_key(key) {
      InputResult::NotHandled => return KeyResult::NotHandled,
      InputResult::Consumed => SearchEvent::Changed(self.query().to_string()),
      InputResult::Submitted(_) => {
        self.active = false;
        SearchEvent::Submitted
      }
      InputResult::Cancelled => {
        *self = Self::default();
        SearchEvent::Changed(String::new())
      }
    };
    KeyResult::Event(event)
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    if self.active {
      draw_prompt(frame, area, "Search", "/", &self.input, 0, palette);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_slash_activates_and_reports_changes() {
    let mut search = SearchInput::new();
    assert_eq!(search.handle_key(key(KeyCode::Char('x'))), KeyResult::NotHandled);
    assert_eq!(search.handle_key(key(KeyCode::Char('/'))), KeyResult::Handled);
    assert!(search.is_active());

    assert_eq!(
      search.handle_key(key(KeyCode::Char('v'))),
      KeyResult::Event(SearchEvent::Changed("v".into()))
    );
    assert_eq!(
      search.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(SearchEvent::Submitted)
    );
    assert_eq!(search.query(), "v");
  }

  #[test]
  fn test_escape_clears_query() {
    let mut search = SearchInput::new();
    search.activate();
    search.handle_key(key(KeyCode::Char('v')));
    assert_eq!(
      search.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(SearchEvent::Changed(String::new()))
    );
    assert_eq!(search.query(), "");
    assert!(!search.is_active());
  }
}
