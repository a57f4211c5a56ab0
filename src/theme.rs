//! Light and dark palettes.

use ratatui::style::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeMode {
  Light,
  #[default]
  Dark,
}

impl ThemeMode {
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "light" => Some(ThemeMode::Light),
      "dark" => Some(ThemeMode::Dark),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ThemeMode::Light => "light",
      ThemeMode::Dark => "dark",
    }
  }

  pub fn toggled(self) -> Self {
    match self {
      ThemeMode::Light => ThemeMode::Dark,
      ThemeMode::Dark => ThemeMode::Light,
    }
  }
}

/// Colors used by every view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
  pub bg: Color,
  pub fg: Color,
  pub muted: Color,
  pub accent: Color,
  pub highlight: Color,
  pub border: Color,
  pub bar_bg: Color,
  pub success: Color,
  pub warning: Color,
  pub error: Color,
}

impl Palette {
  pub fn for_mode(mode: ThemeMode) -> Self {
    match mode {
      ThemeMode::Dark => Self {
        bg: Color::Reset,
        fg: Color::White,
        muted: Color::DarkGray,
        accent: Color::Cyan,
        highlight: Color::DarkGray,
        border: Color::Blue,
        bar_bg: Color::Black,
        success: Color::Green,
        warning: Color::Yellow,
        error: Color::Red,
      },
      ThemeMode::Light => Self {
        bg: Color::White,
        fg: Color::Black,
        muted: Color::Gray,
        accent: Color::Blue,
        highlight: Color::LightBlue,
        border: Color::DarkGray,
        bar_bg: Color::Gray,
        success: Color::Green,
        warning: Color::Magenta,
        error: Color::Red,
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_theme_mode() {
    assert_eq!(ThemeMode::parse("Light"), Some(ThemeMode::Light));
    assert_eq!(ThemeMode::parse(" dark "), Some(ThemeMode::Dark));
    assert_eq!(ThemeMode::parse("solarized"), None);
    assert_eq!(ThemeMode::Dark.toggled(), ThemeMode::Light);
  }
}
