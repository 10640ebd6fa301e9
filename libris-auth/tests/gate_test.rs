//! Gate and access facade tests

use chrono::Duration as ChronoDuration;
use libris_auth::{
    GateOutcome, GateState, LibraryAccess, LogoutReason, MemorySlot, NewMember, Role, SeedUser,
};
use libris_core::{LibrisConfig, ManualClock, SecurityConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

async fn access() -> (LibraryAccess, Arc<ManualClock>) {
    let config = LibrisConfig {
        security: SecurityConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        },
        ..LibrisConfig::default()
    };
    let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));

    let access = LibraryAccess::builder(config)
        .with_slot(Arc::new(MemorySlot::new()))
        .with_clock(clock.clone())
        .build()
        .await
        .unwrap();
    (access, clock)
}

#[tokio::test]
async fn anonymous_visitor_is_redirected_without_rendering() {
    let (access, _) = access().await;
    let rendered = AtomicBool::new(false);

    let outcome = access
        .gate()
        .guard(|_| rendered.store(true, Ordering::SeqCst))
        .await;

    assert_eq!(
        outcome,
        GateOutcome::Redirect {
            location: "/login".to_string()
        }
    );
    assert!(!rendered.load(Ordering::SeqCst));
}

#[tokio::test]
async fn librarian_is_denied_admin_view() {
    let (access, _) = access().await;
    access
        .monitor()
        .login("librarian", "librarian123", false)
        .await
        .unwrap();
    let rendered = AtomicBool::new(false);

    let gate = access.gate_for(Role::Admin);
    assert!(matches!(
        gate.evaluate().await,
        GateState::AccessDenied {
            required: Role::Admin,
            actual: Role::Librarian
        }
    ));

    let outcome = gate.guard(|_| rendered.store(true, Ordering::SeqCst)).await;
    assert!(matches!(outcome, GateOutcome::AccessDenied { .. }));
    assert!(!rendered.load(Ordering::SeqCst));
}

#[tokio::test]
async fn signed_in_staff_see_protected_content() {
    let (access, _) = access().await;
    access.monitor().login("admin", "admin123", false).await.unwrap();

    let outcome = access
        .gate_for(Role::Librarian)
        .guard(|user| format!("Welcome, {}", user.display_name))
        .await;
    assert_eq!(outcome, GateOutcome::Rendered("Welcome, Administrator".to_string()));
}

#[tokio::test]
async fn expired_session_redirect_is_flagged() {
    let (access, clock) = access().await;
    access
        .monitor()
        .login("librarian", "librarian123", false)
        .await
        .unwrap();

    clock.advance(ChronoDuration::hours(8));
    let outcome = access.gate().guard(|_| ()).await;
    assert_eq!(
        outcome,
        GateOutcome::Redirect {
            location: "/login?expired=true".to_string()
        }
    );

    access.monitor().login("librarian", "librarian123", false).await.unwrap();
    access.monitor().logout(LogoutReason::Manual).await;
    let outcome = access.gate().guard(|_| ()).await;
    assert_eq!(
        outcome,
        GateOutcome::Redirect {
            location: "/login".to_string()
        }
    );
}

#[tokio::test]
async fn facade_wires_members_to_signed_in_user() {
    let (access, _) = access().await;
    assert!(access.current_permissions().await.grants().iter().all(|(_, g)| !g));

    let session = access
        .monitor()
        .login("librarian", "librarian123", false)
        .await
        .unwrap();
    let actor = Some(&session.user);
    assert!(access.current_permissions().await.can_create_member);

    let member = access
        .members()
        .create_member(actor, NewMember::patron("Fay", "fay@example.org", "555-0101"))
        .await
        .unwrap();
    assert_eq!(access.members().list(actor).await.unwrap(), vec![member.clone()]);

    access.members().delete_member(actor, &member.id).await.unwrap();
    assert!(access.members().list(actor).await.unwrap().is_empty());
}

#[tokio::test]
async fn custom_seed_replaces_demo_accounts() {
    let config = LibrisConfig {
        security: SecurityConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        },
        ..LibrisConfig::default()
    };
    let access = LibraryAccess::builder(config)
        .with_seed(vec![SeedUser::new("head", "s3cret!", Role::Admin, "Head Librarian")])
        .with_slot(Arc::new(MemorySlot::new()))
        .build()
        .await
        .unwrap();

    assert!(access.monitor().login("admin", "admin123", false).await.is_err());
    assert!(access.monitor().login("head", "s3cret!", true).await.is_ok());
    assert_eq!(access.directory().list().await.len(), 1);
}

#[tokio::test]
async fn demoted_admin_is_turned_away_from_admin_view() {
    let config = LibrisConfig {
        security: SecurityConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        },
        ..LibrisConfig::default()
    };
    let mut seed = libris_auth::UserDirectory::default_seed();
    seed.push(SeedUser::new("boss", "boss1234", Role::Admin, "Head Librarian"));
    let access = LibraryAccess::builder(config)
        .with_seed(seed)
        .with_slot(Arc::new(MemorySlot::new()))
        .build()
        .await
        .unwrap();

    access.monitor().login("admin", "admin123", true).await.unwrap();
    assert!(access.current_permissions().await.can_create_admin);

    let boss = access.directory().get("boss").await.unwrap();
    access
        .directory()
        .change_role(Some(&boss), "admin", Role::Librarian)
        .await
        .unwrap();

    let rendered = AtomicBool::new(false);
    let outcome = access
        .gate_for(Role::Admin)
        .guard(|_| rendered.store(true, Ordering::SeqCst))
        .await;

    assert_eq!(
        outcome,
        GateOutcome::Redirect {
            location: "/login".to_string()
        }
    );
    assert!(!rendered.load(Ordering::SeqCst));
    assert!(!access.current_permissions().await.can_create_admin);
}
