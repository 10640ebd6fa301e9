//! Member Service - Policy-checked member management
//!
//! Staff members (admins and librarians) mirror a login account in the
//! [`UserDirectory`]; creating or deleting the member creates or deletes that
//! account in the same step.

use super::{Member, MemberRepository, MemberStatus, NewMember};
use crate::auth::permissions::SIGN_IN_REQUIRED;
use crate::auth::{
    can_create_user, can_delete_user, permissions_for, NewUser, RoleOption, User, UserDirectory,
};
use crate::{AuthError, AuthResult};
use libris_core::Clock;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Member management on behalf of a signed-in actor
#[derive(Clone)]
pub struct MemberService {
    repository: Arc<dyn MemberRepository>,
    directory: Arc<UserDirectory>,
    clock: Arc<dyn Clock>,
}

impl MemberService {
    pub fn new(
        repository: Arc<dyn MemberRepository>,
        directory: Arc<UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            directory,
            clock,
        }
    }

    pub fn repository(&self) -> &Arc<dyn MemberRepository> {
        &self.repository
    }

    /// Roles `actor` may pick when creating a member
    pub fn available_roles(&self, actor: Option<&User>) -> Vec<RoleOption> {
        permissions_for(actor).available_roles_for_creation
    }

    /// List members; staff only
    pub async fn list(&self, actor: Option<&User>) -> AuthResult<Vec<Member>> {
        ensure_staff(actor)?;
        self.repository.list().await
    }

    /// Register a member, creating the mirrored login for staff roles
    pub async fn create_member(&self, actor: Option<&User>, request: NewMember) -> AuthResult<Member> {
        can_create_user(actor, request.role).into_result()?;
        validate_contact(&request)?;
        let member_number = self.repository.allocate_member_number().await?;

        let username = if request.role.is_staff() {
            let username = request.username.clone().filter(|u| !u.trim().is_empty());
            let password = request.password.clone().filter(|p| !p.is_empty());
            let (Some(username), Some(password)) = (username, password) else {
                return Err(AuthError::validation(
                    "username",
                    "Staff members need a username and password",
                ));
            };

            if self.repository.find_by_username(&username).await?.is_some() {
                return Err(AuthError::Conflict {
                    message: format!("Username '{}' is already taken", username),
                });
            }

            let account = NewUser {
                username,
                password,
                role: request.role,
                display_name: request.name.trim().to_string(),
            };
            Some(self.directory.create_user(actor, account).await?.username)
        } else {
            None
        };

        let member = Member {
            id: Uuid::new_v4().to_string(),
            member_number,
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: request.phone.trim().to_string(),
            role: request.role,
            status: MemberStatus::Active,
            join_date: self.clock.now().date_naive(),
            borrowed_books: 0,
            overdue_books: 0,
            username,
        };

        if let Err(e) = self.repository.insert(member.clone()).await {
            self.rollback_account(member.username.as_deref()).await;
            return Err(e);
        }

        info!(
            member_number = %member.member_number,
            role = %member.role,
            created_by = actor.map(|a| a.username.as_str()),
            "Created member"
        );
        Ok(member)
    }

    /// Activate or deactivate a member
    ///
    /// Staff members may only be toggled by an actor allowed to create their role.
    pub async fn set_status(
        &self,
        actor: Option<&User>,
        member_id: &str,
        status: MemberStatus,
    ) -> AuthResult<Member> {
        ensure_staff(actor)?;
        let mut member = self.require(member_id).await?;
        if member.role.is_staff() {
            can_create_user(actor, member.role).into_result()?;
        }

        member.status = status;
        self.repository.update(member.clone()).await?;
        info!(member_number = %member.member_number, ?status, "Member status changed");
        Ok(member)
    }

    /// Delete a member and any mirrored login
    ///
    /// Administrators cannot be deleted, and nobody can be deleted while they
    /// still have books on loan.
    pub async fn delete_member(&self, actor: Option<&User>, member_id: &str) -> AuthResult<Member> {
        let member = self.require(member_id).await?;
        can_delete_user(actor, member.role).into_result()?;

        if member.has_outstanding_loans() {
            return Err(AuthError::Conflict {
                message: format!(
                    "Member {} still has {} borrowed book(s)",
                    member.member_number, member.borrowed_books
                ),
            });
        }

        let removed = self.repository.delete(member_id).await?;

        if let Some(username) = removed.username.as_deref() {
            match self.directory.remove_user(actor, username).await {
                Ok(_) | Err(AuthError::NotFound { .. }) => {}
                Err(e) => {
                    if let Err(restore) = self.repository.insert(removed.clone()).await {
                        warn!(
                            member_number = %removed.member_number,
                            error = %restore,
                            "Failed to restore member after login removal failed"
                        );
                    }
                    return Err(e);
                }
            }
        }
        info!(
            member_number = %removed.member_number,
            deleted_by = actor.map(|a| a.username.as_str()),
            "Deleted member"
        );
        Ok(removed)
    }

    async fn require(&self, member_id: &str) -> AuthResult<Member> {
        self.repository
            .get(member_id)
            .await?
            .ok_or_else(|| AuthError::not_found(format!("member '{}'", member_id)))
    }

    async fn rollback_account(&self, username: Option<&str>) {
        let Some(username) = username else { return };
        if self.directory.discard(username).await.is_none() {
            warn!(username, "Mirrored account already gone during rollback");
        }
    }
}

fn ensure_staff(actor: Option<&User>) -> AuthResult<()> {
    match actor {
        None => Err(AuthError::permission_denied(SIGN_IN_REQUIRED)),
        Some(_) if permissions_for(actor).can_access_all_features => Ok(()),
        Some(_) => Err(AuthError::permission_denied(
            "Your role is not allowed to manage members",
        )),
    }
}

fn validate_contact(request: &NewMember) -> AuthResult<()> {
    if request.name.trim().is_empty() {
        return Err(AuthError::validation("name", "Name is required"));
    }
    let email = request.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::validation("email", "A valid email address is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, SeedUser};
    use crate::members::InMemoryMemberRepository;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use libris_core::{ManualClock, SecurityConfig};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory repository whose writes can be made to fail
    #[derive(Default)]
    struct FlakyRepository {
        inner: InMemoryMemberRepository,
        fail_allocate: AtomicBool,
        fail_insert: AtomicBool,
    }

    impl FlakyRepository {
        fn unavailable() -> AuthError {
            AuthError::Core(libris_core::storage_error!(
                "Member store unavailable",
                "flaky_repository"
            ))
        }
    }

    #[async_trait]
    impl MemberRepository for FlakyRepository {
        async fn list(&self) -> AuthResult<Vec<Member>> {
            self.inner.list().await
        }

        async fn get(&self, id: &str) -> AuthResult<Option<Member>> {
            self.inner.get(id).await
        }

        async fn find_by_username(&self, username: &str) -> AuthResult<Option<Member>> {
            self.inner.find_by_username(username).await
        }

        async fn allocate_member_number(&self) -> AuthResult<String> {
            if self.fail_allocate.load(Ordering::SeqCst) {
                return Err(Self::unavailable());
            }
            self.inner.allocate_member_number().await
        }

        async fn insert(&self, member: Member) -> AuthResult<()> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(Self::unavailable());
            }
            self.inner.insert(member).await
        }

        async fn update(&self, member: Member) -> AuthResult<()> {
            self.inner.update(member).await
        }

        async fn delete(&self, id: &str) -> AuthResult<Member> {
            self.inner.delete(id).await
        }
    }

    async fn flaky_service() -> (MemberService, Arc<UserDirectory>, Arc<FlakyRepository>) {
        let directory = Arc::new(UserDirectory::new(&security()).unwrap());
        let repository = Arc::new(FlakyRepository::default());
        let service = MemberService::new(
            repository.clone(),
            directory.clone(),
            Arc::new(ManualClock::at_millis(0)),
        );
        (service, directory, repository)
    }

    fn security() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        }
    }

    async fn service() -> (MemberService, Arc<UserDirectory>) {
        let directory = Arc::new(
            UserDirectory::with_seed(&security(), UserDirectory::default_seed())
                .await
                .unwrap(),
        );
        // 2024-03-01T00:00:00Z
        let clock = Arc::new(ManualClock::at_millis(1_709_251_200_000));
        let service = MemberService::new(
            Arc::new(InMemoryMemberRepository::new()),
            directory.clone(),
            clock,
        );
        (service, directory)
    }

    fn staff(role: Role) -> User {
        User::new(role.as_str(), role, role.display_label())
    }

    #[tokio::test]
    async fn patron_gets_number_and_join_date() {
        let (service, _) = service().await;
        let librarian = staff(Role::Librarian);

        let first = service
            .create_member(Some(&librarian), NewMember::patron("Ada", "ada@example.org", "555-0100"))
            .await
            .unwrap();
        let second = service
            .create_member(Some(&librarian), NewMember::patron("Bo", "bo@example.org", ""))
            .await
            .unwrap();

        assert_eq!(first.member_number, "M0001");
        assert_eq!(second.member_number, "M0002");
        assert_eq!(first.join_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(first.status, MemberStatus::Active);
        assert!(first.username.is_none());
    }

    #[tokio::test]
    async fn staff_member_mirrors_login() {
        let (service, directory) = service().await;
        let admin = staff(Role::Admin);

        let member = service
            .create_member(
                Some(&admin),
                NewMember::staff("Lin", "lin@example.org", "", Role::Librarian, "lin", "secret1"),
            )
            .await
            .unwrap();

        assert_eq!(member.username.as_deref(), Some("lin"));
        assert!(directory.validate_credentials("lin", "secret1").await.is_some());

        service.delete_member(Some(&admin), &member.id).await.unwrap();
        assert!(directory.get("lin").await.is_none());
    }

    #[tokio::test]
    async fn staff_member_without_credentials_is_rejected() {
        let (service, directory) = service().await;
        let mut request =
            NewMember::staff("Lin", "lin@example.org", "", Role::Librarian, "lin", "secret1");
        request.password = None;

        let err = service
            .create_member(Some(&staff(Role::Admin)), request)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation { .. }));
        assert!(directory.get("lin").await.is_none());
    }

    #[tokio::test]
    async fn librarian_cannot_create_staff() {
        let (service, _) = service().await;
        let err = service
            .create_member(
                Some(&staff(Role::Librarian)),
                NewMember::staff("Al", "al@example.org", "", Role::Admin, "al", "secret1"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::PermissionDenied { .. }));
        assert_eq!(
            service.available_roles(Some(&staff(Role::Librarian))),
            vec![RoleOption::from(Role::Member)]
        );
        assert!(service.available_roles(None).is_empty());
    }

    #[tokio::test]
    async fn deletion_blocked_by_loans_and_admin_role() {
        let (service, directory) = service().await;
        let admin = staff(Role::Admin);

        let mut borrower = service
            .create_member(Some(&admin), NewMember::patron("Cy", "cy@example.org", ""))
            .await
            .unwrap();
        borrower.borrowed_books = 2;
        service.repository().update(borrower.clone()).await.unwrap();

        let err = service.delete_member(Some(&admin), &borrower.id).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict { .. }));

        let head = service
            .create_member(
                Some(&admin),
                NewMember::staff("Di", "di@example.org", "", Role::Admin, "di", "secret1"),
            )
            .await
            .unwrap();
        let err = service.delete_member(Some(&admin), &head.id).await.unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { .. }));
        assert!(directory.get("di").await.is_some());
    }

    #[tokio::test]
    async fn status_toggle_requires_staff() {
        let (service, _) = service().await;
        let librarian = staff(Role::Librarian);
        let member = service
            .create_member(Some(&librarian), NewMember::patron("Ed", "ed@example.org", ""))
            .await
            .unwrap();

        let updated = service
            .set_status(Some(&librarian), &member.id, MemberStatus::Inactive)
            .await
            .unwrap();
        assert_eq!(updated.status, MemberStatus::Inactive);

        let patron = User::new("ed", Role::Member, "Ed");
        assert!(service
            .set_status(Some(&patron), &member.id, MemberStatus::Active)
            .await
            .is_err());
        assert!(service.set_status(None, &member.id, MemberStatus::Active).await.is_err());
    }

    #[tokio::test]
    async fn seeded_accounts_are_not_members() {
        let (service, directory) = service().await;
        let seeded: Vec<SeedUser> = UserDirectory::default_seed();
        assert_eq!(directory.list().await.len(), seeded.len());
        assert!(service.list(Some(&staff(Role::Admin))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_number_allocation_creates_no_login() {
        let (service, directory, repository) = flaky_service().await;
        repository.fail_allocate.store(true, Ordering::SeqCst);

        let result = service
            .create_member(
                Some(&staff(Role::Admin)),
                NewMember::staff("Gus", "gus@example.org", "", Role::Librarian, "gus", "secret1"),
            )
            .await;

        assert!(matches!(result, Err(AuthError::Core(_))));
        assert!(directory.get("gus").await.is_none());
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_admin_login() {
        let (service, directory, repository) = flaky_service().await;
        repository.fail_insert.store(true, Ordering::SeqCst);

        let result = service
            .create_member(
                Some(&staff(Role::Admin)),
                NewMember::staff("Hal", "hal@example.org", "", Role::Admin, "hal", "secret1"),
            )
            .await;

        assert!(result.is_err());
        assert!(directory.get("hal").await.is_none());
    }

    #[tokio::test]
    async fn refused_login_removal_keeps_member() {
        let (service, directory) = service().await;
        let admin = staff(Role::Admin);

        let member = service
            .create_member(
                Some(&admin),
                NewMember::staff("Ivy", "ivy@example.org", "", Role::Librarian, "ivy", "secret1"),
            )
            .await
            .unwrap();
        // The login was promoted after the member record was written.
        directory.change_role(Some(&admin), "ivy", Role::Admin).await.unwrap();

        let err = service.delete_member(Some(&admin), &member.id).await.unwrap_err();

        assert!(matches!(err, AuthError::PermissionDenied { .. }));
        assert_eq!(service.repository().get(&member.id).await.unwrap(), Some(member));
        assert!(directory.get("ivy").await.is_some());
    }
}
