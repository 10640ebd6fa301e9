//! User directory and credential verification

use super::permissions::{can_create_user, can_delete_user, can_edit_user_role};
use super::Role;
use crate::{AuthError, AuthResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use libris_core::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

/// Authenticated identity, safe to persist in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub display_name: String,
}

impl User {
    pub fn new(username: impl Into<String>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.into(),
            role,
            display_name: display_name.into(),
        }
    }

    /// Whether the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Pre-seeded directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub display_name: String,
}

impl SeedUser {
    pub fn new(username: &str, password: &str, role: Role, display_name: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            role,
            display_name: display_name.to_string(),
        }
    }
}

/// Request to create an account on behalf of an administrator
pub type NewUser = SeedUser;

/// Internal user data with password hash
#[derive(Debug, Clone)]
struct UserRecord {
    user: User,
    password_hash: String,
}

/// In-memory user directory with argon2 password hashes
pub struct UserDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
    hasher: Argon2<'static>,
    /// Verified against when the username is unknown so both paths cost the same
    decoy_hash: String,
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory").finish_non_exhaustive()
    }
}

impl UserDirectory {
    /// Create an empty directory
    pub fn new(security: &SecurityConfig) -> AuthResult<Self> {
        let params = Params::new(
            security.argon2_memory_kib,
            security.argon2_iterations,
            security.argon2_parallelism,
            None,
        )
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let decoy_hash = hash_password(&hasher, &Uuid::new_v4().to_string())?;

        Ok(Self {
            users: RwLock::new(HashMap::new()),
            hasher,
            decoy_hash,
        })
    }

    /// Create a directory pre-seeded with `seed`
    pub async fn with_seed(
        security: &SecurityConfig,
        seed: impl IntoIterator<Item = SeedUser>,
    ) -> AuthResult<Self> {
        let directory = Self::new(security)?;
        for entry in seed {
            directory.insert(entry).await?;
        }
        Ok(directory)
    }

    /// Demo accounts used when no directory is configured
    pub fn default_seed() -> Vec<SeedUser> {
        // Default passwords - should be changed in production
        vec![
            SeedUser::new("admin", "admin123", Role::Admin, "Administrator"),
            SeedUser::new("librarian", "librarian123", Role::Librarian, "Librarian"),
        ]
    }

    /// Verify a username/password pair
    ///
    /// Both lookups are exact and case-sensitive. A miss is a plain `None`; the
    /// caller cannot tell an unknown username from a wrong password.
    pub async fn validate_credentials(&self, username: &str, password: &str) -> Option<User> {
        let users = self.users.read().await;

        match users.get(username) {
            Some(record) if self.verify(password, &record.password_hash) => {
                debug!(username, "Credentials verified");
                Some(record.user.clone())
            }
            Some(_) => {
                warn!(username, "Invalid password");
                None
            }
            None => {
                let _ = self.verify(password, &self.decoy_hash);
                warn!(username, "Unknown username");
                None
            }
        }
    }

    /// Get user by username
    pub async fn get(&self, username: &str) -> Option<User> {
        let users = self.users.read().await;
        users.get(username).map(|record| record.user.clone())
    }

    /// All users, ordered by username
    pub async fn list(&self) -> Vec<User> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().map(|record| record.user.clone()).collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        all
    }

    /// Create a staff account on behalf of `actor`
    pub async fn create_user(&self, actor: Option<&User>, request: NewUser) -> AuthResult<User> {
        can_create_user(actor, request.role).into_result()?;
        let user = self.insert(request).await?;
        info!(
            username = %user.username,
            role = %user.role,
            created_by = actor.map(|a| a.username.as_str()),
            "Created user account"
        );
        Ok(user)
    }

    /// Change a display name; users may edit themselves, admins anyone
    pub async fn update_display_name(
        &self,
        actor: Option<&User>,
        username: &str,
        display_name: &str,
    ) -> AuthResult<User> {
        ensure_self_or_admin(actor, username)?;
        if display_name.trim().is_empty() {
            return Err(AuthError::validation("display_name", "Display name is required"));
        }

        let mut users = self.users.write().await;
        let record = users
            .get_mut(username)
            .ok_or_else(|| AuthError::not_found(format!("user '{}'", username)))?;
        record.user.display_name = display_name.to_string();
        Ok(record.user.clone())
    }

    /// Replace a password; users may change their own, admins anyone's
    pub async fn change_password(
        &self,
        actor: Option<&User>,
        username: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        ensure_self_or_admin(actor, username)?;
        validate_password(new_password)?;
        let password_hash = hash_password(&self.hasher, new_password)?;

        let mut users = self.users.write().await;
        let record = users
            .get_mut(username)
            .ok_or_else(|| AuthError::not_found(format!("user '{}'", username)))?;
        record.password_hash = password_hash;
        info!(username, "Password changed");
        Ok(())
    }

    /// Change a user's role (administrators only)
    pub async fn change_role(
        &self,
        actor: Option<&User>,
        username: &str,
        role: Role,
    ) -> AuthResult<User> {
        can_edit_user_role(actor).into_result()?;
        if !role.is_staff() {
            return Err(AuthError::validation(
                "role",
                "Login accounts must be administrators or librarians",
            ));
        }

        let mut users = self.users.write().await;
        let record = users
            .get_mut(username)
            .ok_or_else(|| AuthError::not_found(format!("user '{}'", username)))?;
        record.user.role = role;
        info!(username, role = %role, "Role changed");
        Ok(record.user.clone())
    }

    /// Delete an account on behalf of `actor`
    pub async fn remove_user(&self, actor: Option<&User>, username: &str) -> AuthResult<User> {
        let mut users = self.users.write().await;
        let target_role = users
            .get(username)
            .map(|record| record.user.role)
            .ok_or_else(|| AuthError::not_found(format!("user '{}'", username)))?;

        can_delete_user(actor, target_role).into_result()?;

        let record = users
            .remove(username)
            .ok_or_else(|| AuthError::not_found(format!("user '{}'", username)))?;
        info!(username, "Removed user account");
        Ok(record.user)
    }

    /// Drop an account without a policy check, for undoing a partial create
    pub(crate) async fn discard(&self, username: &str) -> Option<User> {
        let removed = self.users.write().await.remove(username)?;
        debug!(username, "Discarded user account");
        Some(removed.user)
    }

    async fn insert(&self, request: SeedUser) -> AuthResult<User> {
        if request.username.trim().is_empty() {
            return Err(AuthError::validation("username", "Username is required"));
        }
        if !request.role.is_staff() {
            return Err(AuthError::validation(
                "role",
                "Login accounts must be administrators or librarians",
            ));
        }
        validate_password(&request.password)?;

        let password_hash = hash_password(&self.hasher, &request.password)?;
        let user = User::new(request.username, request.role, request.display_name);

        let mut users = self.users.write().await;
        if users.contains_key(&user.username) {
            return Err(AuthError::Conflict {
                message: format!("Username '{}' is already taken", user.username),
            });
        }
        users.insert(
            user.username.clone(),
            UserRecord {
                user: user.clone(),
                password_hash,
            },
        );

        Ok(user)
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .hasher
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

fn ensure_self_or_admin(actor: Option<&User>, username: &str) -> AuthResult<()> {
    match actor {
        None => Err(AuthError::permission_denied(
            super::permissions::SIGN_IN_REQUIRED,
        )),
        Some(actor) if actor.username == username || actor.is_admin() => Ok(()),
        Some(_) => Err(AuthError::permission_denied(
            "Only administrators can edit other users' accounts",
        )),
    }
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::validation(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

/// Hash password using Argon2
fn hash_password(hasher: &Argon2<'_>, password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    hasher
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}
