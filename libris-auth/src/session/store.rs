//! Session Store - Credential validation and the persisted session record
//!
//! Every read of the slot fails closed: missing, unreadable, malformed and
//! invariant-violating records all come back as "no session".

use super::{Session, SessionSlot};
use crate::auth::{User, UserDirectory};
use crate::AuthResult;
use chrono::SubsecRound;
use libris_core::{Clock, SessionPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Credential check and single-slot session persistence
#[derive(Clone)]
pub struct SessionStore {
    directory: Arc<UserDirectory>,
    slot: Arc<dyn SessionSlot>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl SessionStore {
    pub fn new(
        directory: Arc<UserDirectory>,
        slot: Arc<dyn SessionSlot>,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            directory,
            slot,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn directory(&self) -> &Arc<UserDirectory> {
        &self.directory
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Look up a user by exact username and password
    pub async fn validate_credentials(&self, username: &str, password: &str) -> Option<User> {
        self.directory.validate_credentials(username, password).await
    }

    /// Issue a session for `user` starting now
    pub fn create_session(&self, user: User, remember_me: bool) -> Session {
        // Millisecond precision so the record round-trips through storage exactly.
        let issued_at = self.clock.now().trunc_subsecs(3);
        let expires_at = issued_at + self.policy.ttl(remember_me);

        Session {
            user,
            issued_at,
            expires_at,
            remember_me,
        }
    }

    /// Persist `session` into the slot, replacing any previous one
    pub fn store_session(&self, session: &Session) -> AuthResult<()> {
        let raw = serde_json::to_string(session).map_err(libris_core::LibrisError::from)?;
        self.slot.write(&raw)?;
        debug!(username = %session.user.username, "Stored session");
        Ok(())
    }

    /// Read the stored session, discarding anything that is not a usable record
    ///
    /// Expiry is not checked here; see [`SessionStore::validate_session`].
    pub fn get_stored_session(&self) -> Option<Session> {
        let raw = match self.slot.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Session slot unreadable, treating as signed out");
                return None;
            }
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) if session.is_well_formed() => Some(session),
            Ok(_) => {
                warn!("Stored session violates its invariants, discarding");
                self.discard_corrupt();
                None
            }
            Err(e) => {
                warn!(error = %e, "Stored session is malformed, discarding");
                self.discard_corrupt();
                None
            }
        }
    }

    /// Empty the slot
    pub fn clear_stored_session(&self) -> AuthResult<()> {
        self.slot.clear()?;
        Ok(())
    }

    /// Whether `session` has reached its expiry time
    pub fn is_session_expired(&self, session: &Session) -> bool {
        session.is_expired_at(self.clock.now())
    }

    /// Whether `session` is well-formed and not expired
    pub fn validate_session(&self, session: &Session) -> bool {
        session.is_well_formed() && !self.is_session_expired(session)
    }

    /// Time left before `session` expires, zero once expired
    pub fn session_remaining_time(&self, session: &Session) -> Duration {
        session.remaining_at(self.clock.now())
    }

    fn discard_corrupt(&self) {
        if let Err(e) = self.slot.clear() {
            warn!(error = %e, "Failed to clear corrupt session record");
        }
    }
}
