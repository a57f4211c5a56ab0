//! The `:` command palette table and its matching rules.

/// What a palette command does; the app dispatches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
  Dashboard,
  Tickets,
  Mine,
  New,
  Profile,
  Password,
  Theme,
  Role,
  Logout,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub id: CommandId,
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

const fn command(
  id: CommandId,
  name: &'static str,
  aliases: &'static [&'static str],
  description: &'static str,
) -> Command {
  Command {
    id,
    name,
    aliases,
    description,
  }
}

pub const COMMANDS: &[Command] = &[
  command(CommandId::Dashboard, "dashboard", &["d", "home"], "Dashboard for the active role"),
  command(CommandId::Tickets, "tickets", &["t", "all"], "Browse tickets"),
  command(CommandId::Mine, "mine", &["m", "assigned"], "Tickets assigned to me"),
  command(CommandId::New, "new", &["n", "create"], "Open a new ticket"),
  command(CommandId::Profile, "profile", &["p", "me"], "Edit name and email"),
  command(CommandId::Password, "password", &["pw", "passwd"], "Change password"),
  command(CommandId::Theme, "theme", &["dark", "light"], "Toggle light/dark theme"),
  command(CommandId::Role, "role", &["r", "switch"], "Switch active role"),
  command(CommandId::Logout, "logout", &["signout"], "Sign out"),
  command(CommandId::Quit, "quit", &["q", "exit"], "Exit ticketdesk"),
];

fn any_alias(cmd: &Command, pred: impl Fn(&str) -> bool) -> bool {
  cmd.aliases.iter().any(|a| pred(a))
}

/// How well `needle` matches a command; lower is better.
fn rank(cmd: &Command, needle: &str) -> Option<u8> {
  if cmd.name == needle {
    Some(0)
  } else if any_alias(cmd, |a| a == needle) {
    Some(1)
  } else if cmd.name.starts_with(needle) {
    Some(2)
  } else if any_alias(cmd, |a| a.starts_with(needle)) {
    Some(3)
  } else if cmd.name.contains(needle) || any_alias(cmd, |a| a.contains(needle)) {
    Some(4)
  } else {
    None
  }
}

/// Commands matching `input`, best first; everything for empty input.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let needle = input.trim().to_lowercase();
  if needle.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut ranked: Vec<(u8, &'static Command)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &needle).map(|r| (r, cmd)))
    .collect();
  // Stable, so ties keep table order
  ranked.sort_by_key(|(r, _)| *r);
  ranked.into_iter().map(|(_, cmd)| cmd).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn best(input: &str) -> CommandId {
    get_suggestions(input)[0].id
  }

  #[test]
  fn test_empty_input_lists_everything() {
    assert_eq!(get_suggestions("  ").len(), COMMANDS.len());
  }

  #[test]
  fn test_names_and_aliases() {
    assert_eq!(best("tickets"), CommandId::Tickets);
    assert_eq!(best("m"), CommandId::Mine);
    assert_eq!(best("q"), CommandId::Quit);
    assert_eq!(best("light"), CommandId::Theme);
    assert_eq!(best("PW"), CommandId::Password);
  }

  #[test]
  fn test_prefix_beats_substring() {
    assert_eq!(best("pa"), CommandId::Password);
    assert_eq!(best("pro"), CommandId::Profile);
    assert_eq!(best("gou"), CommandId::Logout);
  }

  #[test]
  fn test_no_match() {
    assert!(get_suggestions("zzz").is_empty());
  }
}
