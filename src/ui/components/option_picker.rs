use super::KeyResult;
use crate::theme::Palette;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState};

/// Events emitted by the picker that the parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerEvent<T> {
  Selected(T),
  Cancelled,
}

/// Centered overlay for choosing one value out of a short list
/// (status, priority, assignee, role).
#[derive(Debug, Clone)]
pub struct OptionPicker<T> {
  active: bool,
  options: Vec<(String, T)>,
  selected: usize,
  title: String,
}

impl<T> Default for OptionPicker<T> {
  fn default() -> Self {
    Self {
      active: false,
      options: Vec::new(),
      selected: 0,
      title: String::new(),
    }
  }
}

impl<T: Clone> OptionPicker<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Show the picker, preselecting the option matching `current`
  pub fn show(&mut self, title: impl Into<String>, options: Vec<(String, T)>, current: Option<&T>)
  where
    T: PartialEq,
  {
    self.selected = current
      .and_then(|c| options.iter().position(|(_, v)| v == c))
      .unwrap_or(0);
    self.active = !options.is_empty();
    self.options = options;
    self.title = title.into();
  }

  pub fn hide(&mut self) {
    self.active = false;
    self.options.clear();
    self.selected = 0;
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<PickerEvent<T>> {
    if !self.active {
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Esc | KeyCode::Char('q') => {
        self.hide();
        KeyResult::Event(PickerEvent::Cancelled)
      }
      KeyCode::Enter => {
        let choice = self.options.get(self.selected).map(|(_, v)| v.clone());
        self.hide();
        match choice {
          Some(value) => KeyResult::Event(PickerEvent::Selected(value)),
          None => KeyResult::Event(PickerEvent::Cancelled),
        }
      }
      KeyCode::Char('j') | KeyCode::Down => {
        if !self.options.is_empty() {
          self.selected = (self.selected + 1) % self.options.len();
        }
        KeyResult::Handled
      }
      KeyCode::Char('k') | KeyCode::Up => {
        if !self.options.is_empty() {
          self.selected = if self.selected == 0 {
            self.options.len() - 1
          } else {
            self.selected - 1
          };
        }
        KeyResult::Handled
      }
      // Modal: swallow everything else
      _ => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    if !self.active || self.options.is_empty() {
      return;
    }

    let max_label = self
      .options
      .iter()
      .map(|(label, _)| label.chars().count())
      .chain(std::iter::once(self.title.chars().count()))
      .max()
      .unwrap_or(10);
    let width = (max_label as u16 + 6).min(area.width.saturating_sub(4)).max(20);
    let height = (self.options.len() as u16 + 2).min(area.height.saturating_sub(4)).max(3);

    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay_area = Rect::new(x, y, width, height).intersection(area);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.warning))
      .title(format!(" {} ", self.title));

    let items: Vec<ListItem> = self
      .options
      .iter()
      .map(|(label, _)| {
        ListItem::new(Line::from(Span::styled(
          label.as_str(),
          Style::default().fg(palette.accent),
        )))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(palette.highlight).fg(palette.fg));

    let mut state = ListState::default();
    state.select(Some(self.selected));

    frame.render_stateful_widget(list, overlay_area, &mut state);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn statuses() -> Vec<(String, i64)> {
    vec![
      ("Open".to_string(), 1),
      ("In Progress".to_string(), 2),
      ("Resolved".to_string(), 3),
    ]
  }

  #[test]
  fn test_preselects_current_and_wraps() {
    let mut picker = OptionPicker::new();
    picker.show("Status", statuses(), Some(&3));
    picker.handle_key(key(KeyCode::Down));
    assert_eq!(
      picker.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(PickerEvent::Selected(1))
    );
    assert!(!picker.is_active());
  }

  #[test]
  fn test_cancel_and_inactive() {
    let mut picker: OptionPicker<i64> = OptionPicker::new();
    assert_eq!(picker.handle_key(key(KeyCode::Enter)), KeyResult::NotHandled);

    picker.show("Status", statuses(), None);
    assert_eq!(
      picker.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(PickerEvent::Cancelled)
    );
  }

  #[test]
  fn test_empty_options_never_activate() {
    let mut picker: OptionPicker<i64> = OptionPicker::new();
    picker.show("Assignee", Vec::new(), None);
    assert!(!picker.is_active());
  }
}
