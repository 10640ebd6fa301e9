//! Libris Auth - Role policy and session lifecycle for the library back office
//!
//! This crate decides who may do what and for how long:
//!
//! - Roles and the fixed role-to-capability table
//! - Credential checks and the single persisted session slot
//! - The session monitor that ends sessions when they expire
//! - The gate that guards protected views
//! - Member management checked against the role policy
//!
//! ## Architecture
//!
//! - **Policy** (`auth`): pure functions from roles to permissions
//! - **Lifecycle** (`session`): storage, validation and expiry timers
//! - **Presentation glue** (`gate`): maps session state to what a view shows

pub mod auth;
pub mod gate;
pub mod members;
pub mod session;

pub use auth::{
    can_create_user, can_delete_user, can_edit_user_role, permissions_for, resolve_permissions,
    resolve_permissions_for_tag, CreateUserDecision, NewUser, PermissionSet, Role, RoleOption,
    SeedUser, User, UserDirectory,
};
pub use gate::{AuthGate, GateOutcome, GateState, SessionCheck};
pub use members::{
    InMemoryMemberRepository, Member, MemberRepository, MemberService, MemberStatus, NewMember,
};
pub use session::{
    FileSlot, LogoutReason, MemorySlot, Session, SessionEvent, SessionMonitor, SessionSlot,
    SessionStatus, SessionStore,
};

use libris_core::{Clock, LibrisConfig, LibrisError, SystemClock};
use std::sync::Arc;
use tracing::info;

/// Authentication and authorization error type
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Deliberately does not say which half of the pair was wrong
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Your session has expired, please sign in again")]
    SessionExpired,

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Core error: {0}")]
    Core(#[from] LibrisError),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Create a permission error
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a validation error for `field`
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// The message to show the user, if this is a policy denial
    pub fn denial_message(&self) -> Option<&str> {
        match self {
            Self::PermissionDenied { message } => Some(message),
            _ => None,
        }
    }
}

/// Wired-up access layer: directory, session monitor and member service
#[derive(Clone)]
pub struct LibraryAccess {
    config: LibrisConfig,
    monitor: SessionMonitor,
    members: MemberService,
}

/// Builder for [`LibraryAccess`]; anything not supplied falls back to config
pub struct LibraryAccessBuilder {
    config: LibrisConfig,
    seed: Vec<SeedUser>,
    slot: Option<Arc<dyn SessionSlot>>,
    clock: Option<Arc<dyn Clock>>,
    repository: Option<Arc<dyn MemberRepository>>,
}

impl LibraryAccessBuilder {
    pub fn new(config: LibrisConfig) -> Self {
        Self {
            config,
            seed: UserDirectory::default_seed(),
            slot: None,
            clock: None,
            repository: None,
        }
    }

    /// Replace the demo accounts
    pub fn with_seed(mut self, seed: Vec<SeedUser>) -> Self {
        self.seed = seed;
        self
    }

    /// Use a specific session slot instead of the configured file
    pub fn with_slot(mut self, slot: Arc<dyn SessionSlot>) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn MemberRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Build and restore any session left by a previous run
    pub async fn build(self) -> AuthResult<LibraryAccess> {
        self.config.validate()?;

        let directory =
            Arc::new(UserDirectory::with_seed(&self.config.security, self.seed).await?);
        let slot: Arc<dyn SessionSlot> = match self.slot {
            Some(slot) => slot,
            None => Arc::new(FileSlot::from_config(&self.config.storage)?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryMemberRepository::new()));

        let store = SessionStore::new(
            directory.clone(),
            slot,
            clock.clone(),
            self.config.session.clone(),
        );
        let monitor = SessionMonitor::new(store);
        let members = MemberService::new(repository, directory, clock);

        let status = monitor.initialize().await;
        info!(authenticated = status.is_authenticated(), "Library access ready");

        Ok(LibraryAccess {
            config: self.config,
            monitor,
            members,
        })
    }
}

impl LibraryAccess {
    /// Build with defaults for everything not in `config`
    pub async fn new(config: LibrisConfig) -> AuthResult<Self> {
        LibraryAccessBuilder::new(config).build().await
    }

    pub fn builder(config: LibrisConfig) -> LibraryAccessBuilder {
        LibraryAccessBuilder::new(config)
    }

    pub fn config(&self) -> &LibrisConfig {
        &self.config
    }

    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    pub fn members(&self) -> &MemberService {
        &self.members
    }

    pub fn directory(&self) -> &Arc<UserDirectory> {
        self.monitor.store().directory()
    }

    /// Permissions of whoever is signed in right now, after a fresh check
    pub async fn current_permissions(&self) -> PermissionSet {
        let status = self.monitor.check().await;
        permissions_for(status.user())
    }

    /// A gate for a view open to any signed-in staff member
    pub fn gate(&self) -> AuthGate {
        AuthGate::new(self.monitor.clone(), &self.config.gate)
    }

    /// A gate for a view restricted to `role`
    pub fn gate_for(&self, role: Role) -> AuthGate {
        self.gate().require(role)
    }
}
