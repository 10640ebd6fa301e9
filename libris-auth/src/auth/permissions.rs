//! Permission System
//!
//! Maps a role to a fixed capability set. The mapping is total and pure: the same
//! role always yields the same permissions, and anything that is not a known
//! role gets no permissions at all.

use super::{Role, User};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Denial shown when nobody is signed in
pub const SIGN_IN_REQUIRED: &str = "Please sign in to continue";
/// Denial for a role that may not create member records
pub const MEMBER_CREATION_DENIED: &str = "Your role is not allowed to create member accounts";
/// Denial for a non-admin creating a librarian
pub const LIBRARIAN_CREATION_DENIED: &str = "Only administrators can create librarian accounts";
/// Denial for a non-admin creating an admin
pub const ADMIN_CREATION_DENIED: &str = "Only administrators can create administrator accounts";
/// Denial for changing someone's role without the capability
pub const ROLE_EDIT_DENIED: &str = "Only administrators can change user roles";
/// Denial for deleting accounts without the capability
pub const USER_DELETION_DENIED: &str = "Your role is not allowed to delete accounts";
/// Denial for a non-admin deleting a librarian
pub const LIBRARIAN_DELETION_DENIED: &str = "Only administrators can delete librarian accounts";
/// Denial for deleting an administrator
pub const ADMIN_DELETION_DENIED: &str = "Administrator accounts cannot be deleted";

/// A role offered in a "create user" picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleOption {
    pub role: Role,
    pub display_label: String,
}

impl From<Role> for RoleOption {
    fn from(role: Role) -> Self {
        Self {
            role,
            display_label: role.display_label().to_string(),
        }
    }
}

/// Capabilities granted to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub can_create_member: bool,
    pub can_create_librarian: bool,
    pub can_create_admin: bool,
    pub can_edit_user_roles: bool,
    pub can_delete_users: bool,
    pub can_access_all_features: bool,
    /// Roles the holder may assign when creating an account, in display order
    pub available_roles_for_creation: Vec<RoleOption>,
}

impl PermissionSet {
    /// The empty set: unauthenticated actors and unknown roles
    pub fn none() -> Self {
        Self {
            can_create_member: false,
            can_create_librarian: false,
            can_create_admin: false,
            can_edit_user_roles: false,
            can_delete_users: false,
            can_access_all_features: false,
            available_roles_for_creation: Vec::new(),
        }
    }

    /// Named boolean capabilities, in declaration order
    pub fn grants(&self) -> [(&'static str, bool); 6] {
        [
            ("can_create_member", self.can_create_member),
            ("can_create_librarian", self.can_create_librarian),
            ("can_create_admin", self.can_create_admin),
            ("can_edit_user_roles", self.can_edit_user_roles),
            ("can_delete_users", self.can_delete_users),
            ("can_access_all_features", self.can_access_all_features),
        ]
    }

    /// Whether every capability granted by `other` is also granted here
    pub fn includes(&self, other: &PermissionSet) -> bool {
        let roles_covered = other
            .available_roles_for_creation
            .iter()
            .all(|option| self.available_roles_for_creation.contains(option));

        roles_covered
            && self
                .grants()
                .iter()
                .zip(other.grants().iter())
                .all(|((_, mine), (_, theirs))| *mine || !*theirs)
    }

    /// Whether `role` appears in the creation picker
    pub fn may_assign(&self, role: Role) -> bool {
        self.available_roles_for_creation
            .iter()
            .any(|option| option.role == role)
    }
}

/// Resolve the permission set for a role
pub fn resolve_permissions(role: Option<Role>) -> PermissionSet {
    match role {
        None => PermissionSet::none(),
        Some(Role::Admin) => PermissionSet {
            can_create_member: true,
            can_create_librarian: true,
            can_create_admin: true,
            can_edit_user_roles: true,
            can_delete_users: true,
            can_access_all_features: true,
            available_roles_for_creation: vec![
                Role::Member.into(),
                Role::Librarian.into(),
                Role::Admin.into(),
            ],
        },
        Some(Role::Librarian) => PermissionSet {
            can_create_member: true,
            can_create_librarian: false,
            can_create_admin: false,
            can_edit_user_roles: false,
            can_delete_users: true,
            can_access_all_features: true,
            available_roles_for_creation: vec![Role::Member.into()],
        },
        // Members have no back-office access.
        Some(Role::Member) => PermissionSet::none(),
    }
}

/// Resolve permissions for a loosely-typed role tag
///
/// Unknown tags get the empty set and are reported as a warning; they never
/// raise an error or inherit another role's trust.
pub fn resolve_permissions_for_tag(tag: Option<&str>) -> PermissionSet {
    match tag {
        None => PermissionSet::none(),
        Some(tag) => match tag.parse::<Role>() {
            Ok(role) => resolve_permissions(Some(role)),
            Err(_) => {
                warn!(role = tag, "Unknown role tag, granting no permissions");
                PermissionSet::none()
            }
        },
    }
}

/// Permissions of an optional actor
pub fn permissions_for(actor: Option<&User>) -> PermissionSet {
    resolve_permissions(actor.map(|user| user.role))
}

/// Outcome of a "create user of role X" check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserDecision {
    pub allowed: bool,
    pub error_message: Option<String>,
}

impl CreateUserDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            error_message: None,
        }
    }

    fn deny(message: &str) -> Self {
        Self {
            allowed: false,
            error_message: Some(message.to_string()),
        }
    }

    /// Convert a denial into an error carrying its message
    pub fn into_result(self) -> crate::AuthResult<()> {
        match (self.allowed, self.error_message) {
            (true, _) => Ok(()),
            (false, Some(message)) => Err(crate::AuthError::permission_denied(message)),
            (false, None) => Err(crate::AuthError::permission_denied(SIGN_IN_REQUIRED)),
        }
    }
}

/// Check whether `actor` may create an account with `target_role`
pub fn can_create_user(actor: Option<&User>, target_role: Role) -> CreateUserDecision {
    let Some(actor) = actor else {
        return CreateUserDecision::deny(SIGN_IN_REQUIRED);
    };

    let permissions = resolve_permissions(Some(actor.role));
    let (allowed, denial) = match target_role {
        Role::Member => (permissions.can_create_member, MEMBER_CREATION_DENIED),
        Role::Librarian => (permissions.can_create_librarian, LIBRARIAN_CREATION_DENIED),
        Role::Admin => (permissions.can_create_admin, ADMIN_CREATION_DENIED),
    };

    if allowed {
        CreateUserDecision::allow()
    } else {
        debug!(
            actor = %actor.username,
            actor_role = %actor.role,
            target_role = %target_role,
            "Account creation denied"
        );
        CreateUserDecision::deny(denial)
    }
}

/// Check whether `actor` may change another user's role
pub fn can_edit_user_role(actor: Option<&User>) -> CreateUserDecision {
    match actor {
        None => CreateUserDecision::deny(SIGN_IN_REQUIRED),
        Some(actor) if resolve_permissions(Some(actor.role)).can_edit_user_roles => {
            CreateUserDecision::allow()
        }
        Some(_) => CreateUserDecision::deny(ROLE_EDIT_DENIED),
    }
}

/// Check whether `actor` may delete an account holding `target_role`
pub fn can_delete_user(actor: Option<&User>, target_role: Role) -> CreateUserDecision {
    let Some(actor) = actor else {
        return CreateUserDecision::deny(SIGN_IN_REQUIRED);
    };

    if !resolve_permissions(Some(actor.role)).can_delete_users {
        return CreateUserDecision::deny(USER_DELETION_DENIED);
    }

    match target_role {
        Role::Admin => CreateUserDecision::deny(ADMIN_DELETION_DENIED),
        Role::Librarian if actor.role != Role::Admin => {
            CreateUserDecision::deny(LIBRARIAN_DELETION_DENIED)
        }
        _ => CreateUserDecision::allow(),
    }
}
