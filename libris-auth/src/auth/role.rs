//! Roles
//!
//! A role is a tag on users and members. It is never trusted on its own: the
//! permission resolver maps it to a fixed capability set.

use serde::{Deserialize, Serialize};

/// Role classification for users and library members
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System administrator
    Admin,
    /// Library staff
    Librarian,
    /// Library patron without back-office access
    Member,
}

impl Role {
    /// Human-readable label shown in role pickers
    pub fn display_label(&self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Librarian => "Librarian",
            Role::Member => "Member",
        }
    }

    /// Staff roles are the ones that carry a login account
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Librarian)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Librarian => "librarian",
            Role::Member => "member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::AuthError;

    /// Exact, lowercase match only. Anything else is an unknown role.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "librarian" => Ok(Role::Librarian),
            "member" => Ok(Role::Member),
            _ => Err(crate::AuthError::UnknownRole(s.to_string())),
        }
    }
}
