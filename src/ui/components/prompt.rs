use super::input::TextInput;
use crate::theme::Palette;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Draw a one-line prompt box near the top-left of `area`, with room for
/// `extra_rows` below the prompt line.
///
/// Returns the area under the prompt line, if there is any.
pub fn draw_prompt(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  sigil: &str,
  input: &TextInput,
  extra_rows: u16,
  palette: &Palette,
) -> Option<Rect> {
  let width = (area.width * 3 / 5).clamp(area.width.min(30), 60);
  let overlay = Rect::new(area.x + 1, area.y + 1, width, extra_rows + 3).intersection(area);
  frame.render_widget(Clear, overlay);

  let block = Block::default()
    .title(format!(" {} ", title))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(palette.warning));
  let inner = block.inner(overlay);
  frame.render_widget(block, overlay);
  if inner.height == 0 {
    return None;
  }

  let [prompt_area, rest] = Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);
  let prompt = Line::from(vec![
    Span::styled(sigil.to_string(), Style::default().fg(palette.warning)),
    Span::styled(input.value().to_string(), Style::default().fg(palette.fg)),
  ]);
  frame.render_widget(Paragraph::new(prompt), prompt_area);

  let column = (sigil.chars().count() + input.cursor_position()) as u16;
  let x = prompt_area.x + column.min(prompt_area.width.saturating_sub(1));
  frame.set_cursor_position((x, prompt_area.y));

  (rest.height > 0).then_some(rest)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::theme::ThemeMode;
  use ratatui::backend::TestBackend;
  use ratatui::layout::Position;

  #[test]
  fn test_cursor_follows_input() {
    let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
    let palette = Palette::for_mode(ThemeMode::Dark);
    let input = TextInput::with_value("ab");

    terminal
      .draw(|frame| {
        let rest = draw_prompt(frame, frame.area(), "Command", ":", &input, 3, &palette);
        assert_eq!(rest.map(|r| r.height), Some(3));
      })
      .unwrap();

    // Box at (1, 1), so the prompt line starts at (2, 2) after the border
    assert_eq!(terminal.get_cursor_position().unwrap(), Position::new(5, 2));
  }
}
