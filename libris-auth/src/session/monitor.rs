//! Session Monitor - Lifecycle state machine for the active session
//!
//! States are `Unauthenticated`, `Fresh` and `Expiring`. A background poll runs
//! every `poll_interval` while a session is active; entering `Expiring`
//! schedules a one-shot timer for the exact remaining time. Both the poll and
//! the timer end the session through the same path.
//!
//! Timers are owned by [`TimerHandle`]s that abort their task when dropped, and
//! every task carries the generation of the session it was started for, so a
//! timer left over from an earlier session can never end a newer one.

use super::{LogoutReason, Session, SessionEvent, SessionStatus, SessionStore};
use crate::auth::User;
use crate::{AuthError, AuthResult};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 16;

/// Owned handle to a scheduled task; the task is aborted when the handle drops
#[derive(Debug)]
pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }

    /// Whether the task has run to completion or been aborted
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Default)]
struct Timers {
    poll: Option<TimerHandle>,
    expiry: Option<TimerHandle>,
}

#[derive(Debug, Default)]
struct MonitorState {
    session: Option<Session>,
    expiring: bool,
    generation: u64,
    last_logout: Option<LogoutReason>,
}

struct MonitorInner {
    store: SessionStore,
    state: RwLock<MonitorState>,
    timers: Mutex<Timers>,
    events: broadcast::Sender<SessionEvent>,
}

/// Watches the active session and ends it on expiry
#[derive(Clone)]
pub struct SessionMonitor {
    inner: Arc<MonitorInner>,
}

impl SessionMonitor {
    pub fn new(store: SessionStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Self {
            inner: Arc::new(MonitorInner {
                store,
                state: RwLock::new(MonitorState::default()),
                timers: Mutex::new(Timers::default()),
                events,
            }),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    /// Subscribe to lifecycle notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Restore a session persisted by an earlier run
    ///
    /// A stored session that has already expired is cleared and recorded as an
    /// expiry, so the next gate redirect can say so.
    pub async fn initialize(&self) -> SessionStatus {
        let store = &self.inner.store;

        match store.get_stored_session() {
            Some(session) if store.validate_session(&session) => {
                info!(username = %session.user.username, "Restored stored session");
                self.inner.establish(session).await;
                self.check().await
            }
            Some(session) => {
                info!(username = %session.user.username, "Stored session already expired");
                if let Err(e) = store.clear_stored_session() {
                    warn!(error = %e, "Failed to clear expired session");
                }
                self.inner.state.write().await.last_logout = Some(LogoutReason::Expired);
                SessionStatus::Unauthenticated
            }
            None => SessionStatus::Unauthenticated,
        }
    }

    /// Verify credentials and start a session
    ///
    /// Any failure is reported as [`AuthError::InvalidCredentials`], whether the
    /// username exists or not.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> AuthResult<Session> {
        let store = &self.inner.store;

        let user = store
            .validate_credentials(username, password)
            .await
            .ok_or(AuthError::InvalidCredentials)?;

        // The previous session's timers must be gone before the slot changes.
        self.inner.retire().await;

        let session = store.create_session(user, remember_me);
        store.store_session(&session)?;

        info!(
            username = %session.user.username,
            role = %session.user.role,
            remember_me,
            expires_at = %session.expires_at,
            "User signed in"
        );
        self.inner.establish(session.clone()).await;

        Ok(session)
    }

    /// End the active session, if any, for the given reason
    pub async fn logout(&self, reason: LogoutReason) {
        self.inner.end_session(None, reason).await;
    }

    /// Run one expiry check immediately
    pub async fn check(&self) -> SessionStatus {
        self.inner.check(None).await
    }

    /// Current state without touching storage
    pub async fn status(&self) -> SessionStatus {
        let state = self.inner.state.read().await;
        match &state.session {
            None => SessionStatus::Unauthenticated,
            Some(session) if state.expiring => SessionStatus::Expiring {
                user: session.user.clone(),
                remaining: self.inner.store.session_remaining_time(session),
            },
            Some(session) => SessionStatus::Fresh {
                user: session.user.clone(),
            },
        }
    }

    /// The signed-in user, if any
    pub async fn current_user(&self) -> Option<User> {
        let state = self.inner.state.read().await;
        state.session.as_ref().map(|session| session.user.clone())
    }

    /// The signed-in user after a fresh check, for actions that need an actor
    ///
    /// Fails with [`AuthError::SessionExpired`] when the last session expired,
    /// so callers can tell the user to sign in again rather than just deny.
    pub async fn require_user(&self) -> AuthResult<User> {
        let status = self.check().await;
        match status.user() {
            Some(user) => Ok(user.clone()),
            None if self.session_expired().await => Err(AuthError::SessionExpired),
            None => Err(AuthError::permission_denied(
                crate::auth::permissions::SIGN_IN_REQUIRED,
            )),
        }
    }

    /// Why the most recent session ended; cleared by the next login
    pub async fn last_logout_reason(&self) -> Option<LogoutReason> {
        self.inner.state.read().await.last_logout
    }

    /// Whether the most recent session ended by expiring rather than by logout
    pub async fn session_expired(&self) -> bool {
        self.last_logout_reason().await == Some(LogoutReason::Expired)
    }

    /// Stop all timers without ending the session
    pub async fn shutdown(&self) {
        let timers = std::mem::take(&mut *self.inner.timers.lock().await);
        drop(timers);
        debug!("Session monitor timers stopped");
    }

    /// Whether any timer task is still scheduled
    pub async fn has_active_timers(&self) -> bool {
        let timers = self.inner.timers.lock().await;
        let active = [&timers.poll, &timers.expiry]
            .into_iter()
            .flatten()
            .any(|handle| !handle.is_finished());
        active
    }
}

impl MonitorInner {
    /// Stop the current session's timers and invalidate its generation
    ///
    /// The in-memory session is dropped without a logout event; the caller is
    /// about to replace it.
    async fn retire(&self) {
        let stale = std::mem::take(&mut *self.timers.lock().await);
        drop(stale);

        let mut state = self.state.write().await;
        state.generation += 1;
        state.expiring = false;
        if let Some(replaced) = state.session.take() {
            debug!(username = %replaced.user.username, "Replacing active session");
        }
    }

    async fn establish(self: &Arc<Self>, session: Session) {
        // Old timers go first so nothing from a previous session survives.
        let stale = std::mem::take(&mut *self.timers.lock().await);
        drop(stale);

        let user = session.user.clone();
        let generation = {
            let mut state = self.state.write().await;
            state.generation += 1;
            state.session = Some(session);
            state.expiring = false;
            state.last_logout = None;
            state.generation
        };

        let _ = self.events.send(SessionEvent::LoggedIn { user });

        let poll = self.spawn_poll(generation);
        self.timers.lock().await.poll = Some(poll);
    }

    fn spawn_poll(self: &Arc<Self>, generation: u64) -> TimerHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.store.policy().poll_interval();

        TimerHandle::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.check(Some(generation)).await.is_authenticated() {
                    break;
                }
            }
        })
    }

    fn spawn_expiry(self: &Arc<Self>, generation: u64, remaining: Duration) -> TimerHandle {
        let weak: Weak<Self> = Arc::downgrade(self);

        TimerHandle::spawn(async move {
            tokio::time::sleep(remaining).await;
            if let Some(inner) = weak.upgrade() {
                debug!(generation, "Scheduled session expiry fired");
                inner
                    .end_session(Some(generation), LogoutReason::Expired)
                    .await;
            }
        })
    }

    /// One poll step. `expected` pins the check to a session generation.
    async fn check(self: &Arc<Self>, expected: Option<u64>) -> SessionStatus {
        let (current, generation) = {
            let state = self.state.read().await;
            (state.session.clone(), state.generation)
        };

        if expected.is_some_and(|g| g != generation) {
            return SessionStatus::Unauthenticated;
        }
        let Some(current) = current else {
            return SessionStatus::Unauthenticated;
        };

        let stored = match self.store.get_stored_session() {
            Some(stored) if stored == current => stored,
            Some(_) => {
                warn!("Stored session no longer matches the active one");
                self.end_session(Some(generation), LogoutReason::Invalid)
                    .await;
                return SessionStatus::Unauthenticated;
            }
            None => {
                warn!("Stored session disappeared or became unreadable");
                self.end_session(Some(generation), LogoutReason::Invalid)
                    .await;
                return SessionStatus::Unauthenticated;
            }
        };

        let account = self.store.directory().get(&stored.user.username).await;
        if !account.is_some_and(|user| user.role == stored.user.role) {
            warn!(
                username = %stored.user.username,
                "Account removed or role changed, ending session"
            );
            self.end_session(Some(generation), LogoutReason::Invalid)
                .await;
            return SessionStatus::Unauthenticated;
        }

        if self.store.is_session_expired(&stored) {
            self.end_session(Some(generation), LogoutReason::Expired)
                .await;
            return SessionStatus::Unauthenticated;
        }

        let remaining = self.store.session_remaining_time(&stored);
        if remaining > self.store.policy().warning_threshold() {
            return SessionStatus::Fresh { user: stored.user };
        }

        let entered = {
            let mut state = self.state.write().await;
            if state.generation != generation || state.session.is_none() {
                return SessionStatus::Unauthenticated;
            }
            !std::mem::replace(&mut state.expiring, true)
        };

        if entered {
            info!(
                username = %stored.user.username,
                remaining_secs = remaining.as_secs(),
                "Session entering expiry window"
            );
            let _ = self.events.send(SessionEvent::ExpiryWarning { remaining });
            let expiry = self.spawn_expiry(generation, remaining);
            self.timers.lock().await.expiry = Some(expiry);
        }

        SessionStatus::Expiring {
            user: stored.user,
            remaining,
        }
    }

    /// Terminal action shared by logout, failed checks and the expiry timer
    async fn end_session(&self, expected: Option<u64>, reason: LogoutReason) {
        let ended = {
            let mut state = self.state.write().await;
            if expected.is_some_and(|g| g != state.generation) {
                return;
            }

            let ended = state.session.take();
            state.generation += 1;
            state.expiring = false;
            if ended.is_some() || reason != LogoutReason::Invalid {
                state.last_logout = Some(reason);
            }
            ended
        };

        if let Err(e) = self.store.clear_stored_session() {
            warn!(error = %e, "Failed to clear stored session");
        }

        if let Some(session) = ended {
            info!(username = %session.user.username, reason = %reason, "Session ended");
            let _ = self.events.send(SessionEvent::LoggedOut { reason });
        }

        // May abort the calling timer task; nothing below this line awaits.
        let timers = std::mem::take(&mut *self.timers.lock().await);
        drop(timers);
    }
}
