use crate::theme::{Palette, ThemeMode};
use crate::ui::view::{ShortcutInfo, ShortcutVisibility};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// What the header shows besides shortcuts
pub struct HeaderInfo<'a> {
  pub title: &'a str,
  pub base_url: &'a str,
  /// "name (Role)" once signed in
  pub user: Option<String>,
  pub theme: ThemeMode,
}

/// Draw the header bar with title, context, and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  info: &HeaderInfo,
  shortcuts: &[ShortcutInfo],
  palette: &Palette,
) {
  let separator = || Span::styled("│", Style::default().fg(palette.muted));

  let mut spans = vec![
    Span::styled(format!(" {} ", info.title), Style::default().fg(palette.accent).bold()),
    separator(),
    Span::styled(
      format!(" {} ", extract_domain(info.base_url)),
      Style::default().fg(palette.fg),
    ),
    separator(),
  ];

  match &info.user {
    Some(user) => spans.push(Span::styled(
      format!(" {} ", user),
      Style::default().fg(palette.warning).bold(),
    )),
    None => spans.push(Span::styled(" signed out ", Style::default().fg(palette.muted))),
  }
  spans.push(separator());
  spans.push(Span::styled(
    format!(" {} ", info.theme.as_str()),
    Style::default().fg(palette.muted),
  ));
  spans.push(Span::raw(" "));

  let mut visible: Vec<&ShortcutInfo> = shortcuts
    .iter()
    .filter(|s| s.visibility == ShortcutVisibility::Always)
    .collect();
  visible.sort_by_key(|s| s.priority);

  for shortcut in visible {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(palette.accent),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(palette.muted),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(palette.bar_bg));
  frame.render_widget(paragraph, area);
}

/// Extract host (and port) from the API base URL
fn extract_domain(url: &str) -> &str {
  let rest = url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url);
  rest.split('/').next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_extract_domain() {
    assert_eq!(extract_domain("https://desk.example.com"), "desk.example.com");
    assert_eq!(extract_domain("https://desk.example.com/api/"), "desk.example.com");
    assert_eq!(extract_domain("http://localhost:3000/"), "localhost:3000");
  }
}
