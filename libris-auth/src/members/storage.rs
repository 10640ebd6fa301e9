//! Member storage
//!
//! Persistence backends implement [`MemberRepository`]; the in-memory one
//! stands in for a database during development and tests.

use super::Member;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Member storage trait for different persistence backends
#[async_trait]
pub trait MemberRepository: Send + Sync {
    /// All members, ordered by member number
    async fn list(&self) -> AuthResult<Vec<Member>>;

    async fn get(&self, id: &str) -> AuthResult<Option<Member>>;

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Member>>;

    /// Reserve the next member number
    async fn allocate_member_number(&self) -> AuthResult<String>;

    /// Insert a new member; fails if the id is taken
    async fn insert(&self, member: Member) -> AuthResult<()>;

    /// Replace an existing member
    async fn update(&self, member: Member) -> AuthResult<()>;

    /// Remove a member, returning the removed record
    async fn delete(&self, id: &str) -> AuthResult<Member>;
}

/// In-memory member storage
#[derive(Debug, Default)]
pub struct InMemoryMemberRepository {
    members: RwLock<HashMap<String, Member>>,
    sequence: RwLock<u32>,
}

impl InMemoryMemberRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemberRepository for InMemoryMemberRepository {
    async fn list(&self) -> AuthResult<Vec<Member>> {
        let members = self.members.read().await;
        let mut all: Vec<Member> = members.values().cloned().collect();
        all.sort_by(|a, b| a.member_number.cmp(&b.member_number));
        Ok(all)
    }

    async fn get(&self, id: &str) -> AuthResult<Option<Member>> {
        Ok(self.members.read().await.get(id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Member>> {
        let members = self.members.read().await;
        Ok(members
            .values()
            .find(|m| m.username.as_deref() == Some(username))
            .cloned())
    }

    async fn allocate_member_number(&self) -> AuthResult<String> {
        let mut sequence = self.sequence.write().await;
        *sequence += 1;
        Ok(format!("M{:04}", *sequence))
    }

    async fn insert(&self, member: Member) -> AuthResult<()> {
        let mut members = self.members.write().await;
        if members.contains_key(&member.id) {
            return Err(AuthError::Conflict {
                message: format!("Member {} already exists", member.id),
            });
        }
        debug!(member_number = %member.member_number, "Stored member");
        members.insert(member.id.clone(), member);
        Ok(())
    }

    async fn update(&self, member: Member) -> AuthResult<()> {
        let mut members = self.members.write().await;
        match members.get_mut(&member.id) {
            Some(existing) => {
                *existing = member;
                Ok(())
            }
            None => Err(AuthError::not_found(format!("member '{}'", member.id))),
        }
    }

    async fn delete(&self, id: &str) -> AuthResult<Member> {
        self.members
            .write()
            .await
            .remove(id)
            .ok_or_else(|| AuthError::not_found(format!("member '{}'", id)))
    }
}
