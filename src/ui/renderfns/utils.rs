use crate::theme::Palette;
use ratatui::prelude::Color;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Render an RFC 3339 timestamp as local "YYYY-MM-DD HH:MM"; anything else is shown as is
pub fn format_timestamp(value: &str) -> String {
  chrono::DateTime::parse_from_rfc3339(value)
    .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_else(|_| value.to_string())
}

/// Parse a `#rrggbb` color as the backend sends it for statuses and priorities
pub fn parse_hex_color(value: &str) -> Option<Color> {
  let hex = value.trim().strip_prefix('#')?;
  if hex.len() != 6 || !hex.is_ascii() {
    return None;
  }
  let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
  Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
}

/// Display color for a ticket status, by name
pub fn status_color(status: &str, palette: &Palette) -> Color {
  match status.to_ascii_lowercase().as_str() {
    "resolved" | "closed" | "done" => palette.success,
    "in progress" | "pending" | "waiting" | "on hold" => palette.warning,
    "open" | "new" => palette.accent,
    _ => palette.fg,
  }
}

/// Display color for a priority level (higher is more urgent)
pub fn priority_color(level: i64, palette: &Palette) -> Color {
  match level {
    l if l >= 3 => palette.error,
    2 => palette.warning,
    _ => palette.muted,
  }
}
