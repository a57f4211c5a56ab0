//! User roles and what each of them may do.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric id of the support role, as used by `GET /api/users?role=`.
pub const SUPPORT_ROLE_ID: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
  Visitor,
  User,
  Support,
  Manager,
}

impl Role {
  /// Parse a role as the backend spells it. Unknown names map to `Visitor`.
  pub fn from_wire(name: &str) -> Self {
    match name.trim().to_ascii_uppercase().as_str() {
      "USER" => Role::User,
      "SUPPORT" | "AGENT" => Role::Support,
      "MANAGER" | "ADMIN" => Role::Manager,
      _ => Role::Visitor,
    }
  }

  pub fn wire_name(self) -> &'static str {
    match self {
      Role::Visitor => "VISITOR",
      Role::User => "USER",
      Role::Support => "SUPPORT",
      Role::Manager => "MANAGER",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Role::Visitor => "Visitor",
      Role::User => "User",
      Role::Support => "Support",
      Role::Manager => "Manager",
    }
  }

  pub fn can(self, permission: Permission) -> bool {
    match permission {
      Permission::ChangeStatus | Permission::ChangePriority | Permission::AssignSelf => {
        matches!(self, Role::Support | Role::Manager)
      }
      Permission::AssignOthers => self == Role::Manager,
      Permission::CreateTicket | Permission::PostMessage => self != Role::Visitor,
    }
  }
}

impl From<String> for Role {
  fn from(value: String) -> Self {
    Role::from_wire(&value)
  }
}

impl From<Role> for String {
  fn from(value: Role) -> Self {
    value.wire_name().to_string()
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Actions gated on the active role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
  ChangeStatus,
  ChangePriority,
  AssignSelf,
  AssignOthers,
  CreateTicket,
  PostMessage,
}

/// Pick the role to act as.
///
/// A requested role (flag or persisted choice) wins when the user actually
/// holds it; otherwise the highest held role is used.
pub fn resolve_active_role(held: &[Role], requested: Option<Role>) -> Role {
  if let Some(role) = requested.filter(|r| held.contains(r)) {
    return role;
  }
  held.iter().copied().max().unwrap_or(Role::Visitor)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_wire_aliases() {
    assert_eq!(Role::from_wire("AGENT"), Role::Support);
    assert_eq!(Role::from_wire("support"), Role::Support);
    assert_eq!(Role::from_wire("ADMIN"), Role::Manager);
    assert_eq!(Role::from_wire("MANAGER"), Role::Manager);
    assert_eq!(Role::from_wire("USER"), Role::User);
    assert_eq!(Role::from_wire("janitor"), Role::Visitor);
  }

  #[test]
  fn test_roles_deserialize_from_aliases() {
    let roles: Vec<Role> = serde_json::from_str(r#"["USER", "AGENT"]"#).unwrap();
    assert_eq!(roles, vec![Role::User, Role::Support]);
    assert_eq!(serde_json::to_string(&Role::Manager).unwrap(), r#""MANAGER""#);
  }

  #[test]
  fn test_permissions() {
    assert!(!Role::User.can(Permission::ChangeStatus));
    assert!(Role::Support.can(Permission::ChangePriority));
    assert!(Role::Support.can(Permission::AssignSelf));
    assert!(!Role::Support.can(Permission::AssignOthers));
    assert!(Role::Manager.can(Permission::AssignOthers));
    assert!(Role::User.can(Permission::CreateTicket));
    assert!(!Role::Visitor.can(Permission::PostMessage));
  }

  #[test]
  fn test_resolve_active_role() {
    let held = [Role::User, Role::Support];
    assert_eq!(resolve_active_role(&held, None), Role::Support);
    assert_eq!(resolve_active_role(&held, Some(Role::User)), Role::User);
    // Not held, fall back to the highest
    assert_eq!(resolve_active_role(&held, Some(Role::Manager)), Role::Support);
    assert_eq!(resolve_active_role(&[], None), Role::Visitor);
  }
}
