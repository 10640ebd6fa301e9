//! Authentication and Authorization Module
//!
//! Roles, the fixed role-to-capability policy, and the user directory that
//! verifies credentials.

pub mod permissions;
pub mod role;
pub mod users;

pub use permissions::{
    can_create_user, can_delete_user, can_edit_user_role, permissions_for, resolve_permissions,
    resolve_permissions_for_tag, CreateUserDecision, PermissionSet, RoleOption,
};
pub use role::Role;
pub use users::{NewUser, SeedUser, User, UserDirectory};
