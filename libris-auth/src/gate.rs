//! Authentication gate for protected views
//!
//! The gate turns the monitor's view of the session into one of four states and
//! only ever invokes the protected content in [`GateState::Render`].

use crate::auth::{Role, User};
use crate::session::{LogoutReason, SessionMonitor};
use libris_core::GateConfig;
use tracing::debug;

/// What the gate knows about the session at decision time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    /// The session check has not completed yet
    Pending,
    /// No valid session
    Unauthenticated { last_logout: Option<LogoutReason> },
    /// Valid session for this user
    Authenticated(User),
}

/// Per-render gate state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Loading,
    /// Send the visitor to the login page; `expired` marks an expiry logout
    Redirect { expired: bool },
    AccessDenied { required: Role, actual: Role },
    Render { user: User },
}

/// Result of guarding protected content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    Loading,
    Redirect { location: String },
    AccessDenied { message: String },
    Rendered(T),
}

impl<T> GateOutcome<T> {
    pub fn is_rendered(&self) -> bool {
        matches!(self, GateOutcome::Rendered(_))
    }
}

/// Whether a user holding `actual` satisfies a view requiring `required`
///
/// Administrators satisfy every requirement.
pub fn satisfies(actual: Role, required: Role) -> bool {
    actual == required || actual == Role::Admin
}

/// Decide the gate state for a session check
pub fn decide(check: &SessionCheck, required_role: Option<Role>) -> GateState {
    match check {
        SessionCheck::Pending => GateState::Loading,
        SessionCheck::Unauthenticated { last_logout } => GateState::Redirect {
            expired: *last_logout == Some(LogoutReason::Expired),
        },
        SessionCheck::Authenticated(user) => match required_role {
            Some(required) if !satisfies(user.role, required) => GateState::AccessDenied {
                required,
                actual: user.role,
            },
            _ => GateState::Render { user: user.clone() },
        },
    }
}

/// Wraps a protected view
#[derive(Clone)]
pub struct AuthGate {
    monitor: SessionMonitor,
    required_role: Option<Role>,
    login_path: String,
}

impl AuthGate {
    pub fn new(monitor: SessionMonitor, config: &GateConfig) -> Self {
        Self {
            monitor,
            required_role: None,
            login_path: config.login_path.clone(),
        }
    }

    /// Restrict the view to `role` (and administrators)
    pub fn require(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn required_role(&self) -> Option<Role> {
        self.required_role
    }

    /// Run a session check and decide the state
    pub async fn evaluate(&self) -> GateState {
        let status = self.monitor.check().await;
        let check = match status.user() {
            Some(user) => SessionCheck::Authenticated(user.clone()),
            None => SessionCheck::Unauthenticated {
                last_logout: self.monitor.last_logout_reason().await,
            },
        };

        let state = decide(&check, self.required_role);
        debug!(?state, required_role = ?self.required_role, "Gate evaluated");
        state
    }

    /// Evaluate and render `children` only if access is granted
    pub async fn guard<T, F>(&self, children: F) -> GateOutcome<T>
    where
        F: FnOnce(&User) -> T,
    {
        let state = self.evaluate().await;
        self.outcome(state, children)
    }

    /// Map a state to an outcome, invoking `children` only in `Render`
    pub fn outcome<T, F>(&self, state: GateState, children: F) -> GateOutcome<T>
    where
        F: FnOnce(&User) -> T,
    {
        match state {
            GateState::Loading => GateOutcome::Loading,
            GateState::Redirect { expired } => GateOutcome::Redirect {
                location: self.redirect_location(expired),
            },
            GateState::AccessDenied { required, actual } => GateOutcome::AccessDenied {
                message: format!(
                    "This page requires the {} role; you are signed in as {}",
                    required.display_label().to_lowercase(),
                    actual.display_label().to_lowercase()
                ),
            },
            GateState::Render { user } => GateOutcome::Rendered(children(&user)),
        }
    }

    /// Login URL, flagged when the previous session expired
    pub fn redirect_location(&self, expired: bool) -> String {
        if expired {
            format!("{}?expired=true", self.login_path)
        } else {
            self.login_path.clone()
        }
    }
}
