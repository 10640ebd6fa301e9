//! Member Types

use crate::auth::Role;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether a member may currently use the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Inactive,
}

/// Library patron or staff record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub member_number: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub status: MemberStatus,
    pub join_date: NaiveDate,
    /// Copies currently on loan
    pub borrowed_books: u32,
    /// Copies on loan past their due date
    pub overdue_books: u32,
    /// Login name of the mirrored user, for staff roles only
    pub username: Option<String>,
}

impl Member {
    pub fn has_outstanding_loans(&self) -> bool {
        self.borrowed_books > 0
    }
}

/// Request to register a member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    /// Required for staff roles
    pub username: Option<String>,
    /// Required for staff roles
    pub password: Option<String>,
}

impl NewMember {
    /// A patron without login credentials
    pub fn patron(name: &str, email: &str, phone: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            role: Role::Member,
            username: None,
            password: None,
        }
    }

    /// A staff member with login credentials
    pub fn staff(
        name: &str,
        email: &str,
        phone: &str,
        role: Role,
        username: &str,
        password: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            role,
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }
}
