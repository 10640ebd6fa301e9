//! Session Types - Core data structures for the session lifecycle

use crate::auth::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A time-bounded proof of authentication for one client context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The authenticated user
    pub user: User,
    /// When the session was issued (millisecond precision)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    /// When the session stops being valid (millisecond precision)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    /// Whether the long "remember me" lifetime was applied
    pub remember_me: bool,
}

impl Session {
    /// Structural invariants a decoded record must satisfy to be trusted
    pub fn is_well_formed(&self) -> bool {
        self.expires_at > self.issued_at
            && !self.user.id.trim().is_empty()
            && !self.user.username.trim().is_empty()
            && self.user.role.is_staff()
    }

    /// Whether the session has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry at `now`, never negative
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoutReason {
    /// The user signed out
    Manual,
    /// The session reached its expiry time
    Expired,
    /// The stored session was missing, corrupt or otherwise unusable
    Invalid,
}

impl std::fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogoutReason::Manual => write!(f, "manual"),
            LogoutReason::Expired => write!(f, "expired"),
            LogoutReason::Invalid => write!(f, "invalid"),
        }
    }
}

/// Lifecycle state reported by the session monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No valid session
    Unauthenticated,
    /// Valid session with more than the warning threshold left
    Fresh { user: User },
    /// Valid session at or under the warning threshold
    Expiring { user: User, remaining: Duration },
}

impl SessionStatus {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionStatus::Unauthenticated => None,
            SessionStatus::Fresh { user } | SessionStatus::Expiring { user, .. } => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

/// Notifications published by the session monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was established, by login or restored from storage
    LoggedIn { user: User },
    /// The session entered the warning window
    ExpiryWarning { remaining: Duration },
    /// The session ended
    LoggedOut { reason: LogoutReason },
}
