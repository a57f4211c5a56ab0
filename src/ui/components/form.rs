use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::theme::Palette;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

/// Events emitted by a form that the owning view needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  /// Enter on the last field
  Submitted,
  /// Escape pressed
  Cancelled,
}

#[derive(Debug, Clone)]
struct FormField {
  label: &'static str,
  input: TextInput,
  masked: bool,
  required: bool,
}

/// A vertical stack of labelled text fields with Tab focus cycling.
#[derive(Debug, Clone, Default)]
pub struct Form {
  fields: Vec<FormField>,
  focus: usize,
}

impl Form {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn field(mut self, label: &'static str) -> Self {
    self.fields.push(FormField {
      label,
      input: TextInput::new(),
      masked: false,
      required: true,
    });
    self
  }

  /// A field whose contents are rendered as bullets
  pub fn masked(mut self, label: &'static str) -> Self {
    self = self.field(label);
    if let Some(field) = self.fields.last_mut() {
      field.masked = true;
    }
    self
  }

  /// Make the last added field optional
  pub fn optional(mut self) -> Self {
    if let Some(field) = self.fields.last_mut() {
      field.required = false;
    }
    self
  }

  /// Prefill the last added field
  pub fn prefilled(mut self, value: impl Into<String>) -> Self {
    if let Some(field) = self.fields.last_mut() {
      field.input = TextInput::with_value(value);
    }
    self
  }

  pub fn value(&self, index: usize) -> &str {
    self.fields.get(index).map(|f| f.input.value()).unwrap_or("")
  }

  pub fn focus(&self) -> usize {
    self.focus
  }

  pub fn focus_next(&mut self) {
    if !self.fields.is_empty() {
      self.focus = (self.focus + 1) % self.fields.len();
    }
  }

  pub fn focus_prev(&mut self) {
    if !self.fields.is_empty() {
      self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
    }
  }

  /// Label of the first required field left blank
  pub fn missing_required(&self) -> Option<&'static str> {
    self
      .fields
      .iter()
      .find(|f| f.required && f.input.value().trim().is_empty())
      .map(|f| f.label)
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    match key.code {
      KeyCode::Tab | KeyCode::Down => {
        self.focus_next();
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus_prev();
        return KeyResult::Handled;
      }
      _ => {}
    }

    let last = self.fields.len().saturating_sub(1);
    let Some(field) = self.fields.get_mut(self.focus) else {
      return KeyResult::NotHandled;
    };

    match field.input.handle_key(key) {
      InputResult::Submitted(_) if self.focus < last => {
        self.focus += 1;
        KeyResult::Handled
      }
      InputResult::Submitted(_) => KeyResult::Event(FormEvent::Submitted),
      InputResult::Cancelled => KeyResult::Event(FormEvent::Cancelled),
      InputResult::Consumed => KeyResult::Handled,
      InputResult::NotHandled => KeyResult::NotHandled,
    }
  }

  /// Rows needed to draw the form inside its border
  pub fn height(&self) -> u16 {
    self.fields.len() as u16 * 2 + 1
  }

  pub fn render(&self, frame: &mut Frame, area: Rect, title: &str, palette: &Palette) {
    let block = Block::default()
      .title(format!(" {} ", title))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.border));

    let label_width = self.fields.iter().map(|f| f.label.len()).max().unwrap_or(0) + 2;

    let mut lines = Vec::new();
    for (i, field) in self.fields.iter().enumerate() {
      let focused = i == self.focus;
      let shown = if field.masked {
        "•".repeat(field.input.value().chars().count())
      } else {
        field.input.value().to_string()
      };

      let label_style = if focused {
        Style::default().fg(palette.accent).bold()
      } else {
        Style::default().fg(palette.muted)
      };

      let mut spans = vec![
        Span::styled(format!(" {:<width$}", field.label, width = label_width), label_style),
        Span::styled(shown, Style::default().fg(palette.fg)),
      ];
      if focused {
        spans.push(Span::styled("_", Style::default().fg(palette.accent)));
      }
      lines.push(Line::from(spans));
      lines.push(Line::default());
    }

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_str(form: &mut Form, s: &str) {
    for c in s.chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
  }

  fn login_form() -> Form {
    Form::new().field("Email").masked("Password")
  }

  #[test]
  fn test_enter_advances_then_submits() {
    let mut form = login_form();
    type_str(&mut form, "ana@example.com");
    assert_eq!(form.handle_key(key(KeyCode::Enter)), KeyResult::Handled);
    assert_eq!(form.focus(), 1);

    type_str(&mut form, "hunter2");
    assert_eq!(
      form.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(FormEvent::Submitted)
    );
    assert_eq!(form.value(0), "ana@example.com");
    assert_eq!(form.value(1), "hunter2");
  }

  #[test]
  fn test_tab_cycles_focus() {
    let mut form = login_form();
    form.handle_key(key(KeyCode::Tab));
    form.handle_key(key(KeyCode::Tab));
    assert_eq!(form.focus(), 0);
    form.handle_key(key(KeyCode::BackTab));
    assert_eq!(form.focus(), 1);
  }

  #[test]
  fn test_missing_required_skips_optional_fields() {
    let mut form = Form::new().field("Title").field("Note").optional();
    assert_eq!(form.missing_required(), Some("Title"));

    type_str(&mut form, "  ");
    assert_eq!(form.missing_required(), Some("Title"));

    type_str(&mut form, "VPN down");
    assert_eq!(form.missing_required(), None);
  }

  #[test]
  fn test_prefilled_and_cancel() {
    let mut form = Form::new().field("Name").prefilled("Ana");
    assert_eq!(form.value(0), "Ana");
    assert_eq!(
      form.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(FormEvent::Cancelled)
    );
  }
}
