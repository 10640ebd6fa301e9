//! Role policy tests

use libris_auth::auth::permissions::{
    ADMIN_CREATION_DENIED, LIBRARIAN_CREATION_DENIED, SIGN_IN_REQUIRED,
};
use libris_auth::{
    can_create_user, resolve_permissions, resolve_permissions_for_tag, AuthError, PermissionSet,
    Role, User,
};

const ROLES: [Role; 3] = [Role::Admin, Role::Librarian, Role::Member];

fn actor(role: Role) -> User {
    User::new(format!("{}-actor", role), role, "Actor")
}

#[test]
fn resolution_is_deterministic() {
    for role in ROLES {
        assert_eq!(resolve_permissions(Some(role)), resolve_permissions(Some(role)));
    }
    assert_eq!(resolve_permissions(None), resolve_permissions(None));
}

#[test]
fn admin_permissions_include_librarian_permissions() {
    let admin = resolve_permissions(Some(Role::Admin));
    let librarian = resolve_permissions(Some(Role::Librarian));

    for ((name, admin_has), (_, librarian_has)) in admin.grants().iter().zip(librarian.grants()) {
        assert!(*admin_has || !librarian_has, "librarian has {} but admin does not", name);
    }
    assert!(admin.includes(&librarian));
}

#[test]
fn creation_check_agrees_with_picker() {
    for actor_role in ROLES {
        let permissions = resolve_permissions(Some(actor_role));
        let user = actor(actor_role);

        for target in ROLES {
            let decision = can_create_user(Some(&user), target);
            assert_eq!(
                decision.allowed,
                permissions.may_assign(target),
                "{} creating {}",
                actor_role,
                target
            );
            assert_eq!(decision.allowed, decision.error_message.is_none());
        }
    }
}

#[test]
fn nobody_signed_in_gets_nothing() {
    assert_eq!(resolve_permissions(None), PermissionSet::none());
    for target in ROLES {
        let decision = can_create_user(None, target);
        assert!(!decision.allowed);
        assert_eq!(decision.error_message.as_deref(), Some(SIGN_IN_REQUIRED));
    }
}

#[test]
fn unknown_roles_never_inherit_trust() {
    for tag in ["superadmin", "ADMIN", "Admin ", "", "root"] {
        assert_eq!(resolve_permissions_for_tag(Some(tag)), PermissionSet::none());
    }
    assert!(matches!("owner".parse::<Role>(), Err(AuthError::UnknownRole(tag)) if tag == "owner"));
}

#[test]
fn librarian_creating_staff_gets_role_specific_denials() {
    let librarian = actor(Role::Librarian);

    let err = can_create_user(Some(&librarian), Role::Librarian)
        .into_result()
        .unwrap_err();
    assert_eq!(err.denial_message(), Some(LIBRARIAN_CREATION_DENIED));

    let err = can_create_user(Some(&librarian), Role::Admin)
        .into_result()
        .unwrap_err();
    assert_eq!(err.denial_message(), Some(ADMIN_CREATION_DENIED));
}

#[test]
fn member_role_has_no_back_office_access() {
    let member = resolve_permissions(Some(Role::Member));
    assert!(member.grants().iter().all(|(_, granted)| !granted));
    assert!(member.available_roles_for_creation.is_empty());
}
