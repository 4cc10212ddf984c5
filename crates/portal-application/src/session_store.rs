//! Session store.
//!
//! Owns the authenticated identity, its persisted copy, and the rule that the
//! last explicit `login`/`logout` wins over any background profile refresh.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use portal_core::error::{AuthError, PortalError, Result, SyncError};
use portal_core::session::{ProfileService, Session, SessionRepository, SessionToken, UserProfile};

/// What consumers observe about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    /// True until the persisted identity has been restored.
    pub is_bootstrapping: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.session.as_ref().map(|s| &s.token)
    }

    pub fn identifier(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.identifier.as_str())
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            session: None,
            is_bootstrapping: true,
        }
    }
}

/// Result of a profile refresh that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fresh profile replaced the working session.
    Applied,
    /// An explicit login or logout happened while the fetch was in flight.
    Discarded,
    /// Nobody is logged in.
    NoSession,
}

/// Serializes commits of session changes.
///
/// `epoch` advances on every explicit `login`/`logout`. A fetch records the
/// epoch it started in and may only commit if it is unchanged.
#[derive(Debug, Default)]
struct CommitState {
    epoch: u64,
}

pub struct SessionStore {
    profiles: Arc<dyn ProfileService>,
    repository: Arc<dyn SessionRepository>,
    state: watch::Sender<SessionSnapshot>,
    commit: Mutex<CommitState>,
}

impl SessionStore {
    pub fn new(profiles: Arc<dyn ProfileService>, repository: Arc<dyn SessionRepository>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            profiles,
            repository,
            state,
            commit: Mutex::new(CommitState::default()),
        }
    }

    // ============================================================================
    // Observers
    // ============================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.state.borrow().is_bootstrapping
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.borrow().session.as_ref().map(|s| s.user.clone())
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn token(&self) -> Option<SessionToken> {
        self.state.borrow().token().cloned()
    }

    // ============================================================================
    // Operations
    // ============================================================================

    /// Restores the persisted session, if any, and schedules a background
    /// re-fetch of its profile.
    ///
    /// Returns the handle of the background refresh so callers (and tests)
    /// can await it. A failed or unreadable load leaves the store
    /// unauthenticated.
    pub async fn bootstrap(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let restored = match self.repository.load().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    "[SessionStore] {}",
                    SyncError::Persistence(format!("could not read persisted session: {}", e))
                );
                None
            }
        };

        let ticket = {
            let commit = self.commit.lock().await;
            self.state.send_modify(|snapshot| {
                // An explicit login may already have run; never overwrite it.
                if snapshot.session.is_none() {
                    snapshot.session = restored.clone();
                }
                snapshot.is_bootstrapping = false;
            });
            commit.epoch
        };

        let Some(session) = restored else {
            tracing::debug!("[SessionStore] No persisted session");
            return None;
        };

        tracing::info!(
            identifier = %session.identifier,
            "[SessionStore] Restored persisted session, refreshing profile in background"
        );

        let store = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = store.refresh_from(ticket, session).await {
                tracing::warn!("[SessionStore] Background refresh failed: {}", e);
            }
        }))
    }

    /// Fetches the profile for `identifier` and makes it the session.
    ///
    /// On failure the previous session, if any, is left untouched.
    pub async fn login(&self, identifier: &str) -> Result<Session> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AuthError::UnknownIdentifier(String::new()).into());
        }

        let ticket = {
            let mut commit = self.commit.lock().await;
            commit.epoch += 1;
            commit.epoch
        };

        tracing::info!(identifier = %identifier, "[SessionStore] Logging in");
        let lookup = self
            .profiles
            .fetch_profile(identifier, None)
            .await
            .map_err(|e| AuthError::from_backend(identifier, e))?;
        let token = lookup.token.ok_or(AuthError::MissingToken)?;

        let session = Session::new(identifier, token, lookup.profile);

        let commit = self.commit.lock().await;
        if commit.epoch != ticket {
            tracing::info!(
                identifier = %identifier,
                "[SessionStore] Login superseded by a later session change"
            );
            return Err(AuthError::Superseded.into());
        }

        self.persist(&session).await;
        self.state.send_modify(|snapshot| {
            snapshot.session = Some(session.clone());
            snapshot.is_bootstrapping = false;
        });
        drop(commit);

        tracing::info!(identifier = %identifier, "[SessionStore] Logged in");
        Ok(session)
    }

    /// Clears the session and its persisted copy. Idempotent.
    pub async fn logout(&self) {
        let mut commit = self.commit.lock().await;
        commit.epoch += 1;

        let was_authenticated = self.state.send_if_modified(|snapshot| {
            snapshot.is_bootstrapping = false;
            snapshot.session.take().is_some()
        });

        if let Err(e) = self.repository.clear().await {
            tracing::warn!(
                "[SessionStore] {}",
                SyncError::Persistence(format!("could not clear persisted session: {}", e))
            );
        }
        drop(commit);

        if was_authenticated {
            tracing::info!("[SessionStore] Logged out");
        }
    }

    /// Re-fetches the current user's profile and overwrites the session.
    ///
    /// Failures are returned as [`SyncError::Profile`] and leave the session
    /// as it was.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let (ticket, session) = {
            let commit = self.commit.lock().await;
            (commit.epoch, self.session())
        };
        let Some(session) = session else {
            return Ok(RefreshOutcome::NoSession);
        };
        self.refresh_from(ticket, session).await
    }

    async fn refresh_from(&self, ticket: u64, base: Session) -> Result<RefreshOutcome> {
        let lookup = self
            .profiles
            .fetch_profile(&base.identifier, Some(&base.token))
            .await
            .map_err(|e| PortalError::from(SyncError::Profile(e.to_string())))?;

        let commit = self.commit.lock().await;
        let current = self.session();
        let still_current = commit.epoch == ticket
            && current.as_ref().map(|s| s.identifier.as_str()) == Some(base.identifier.as_str());
        let Some(mut updated) = current.filter(|_| still_current) else {
            tracing::debug!(
                identifier = %base.identifier,
                "[SessionStore] Discarding profile refresh after session change"
            );
            return Ok(RefreshOutcome::Discarded);
        };

        updated.apply_refresh(lookup.profile, lookup.token);
        self.persist(&updated).await;
        self.state.send_modify(|snapshot| snapshot.session = Some(updated.clone()));
        drop(commit);

        tracing::debug!(identifier = %base.identifier, "[SessionStore] Profile refreshed");
        Ok(RefreshOutcome::Applied)
    }

    /// Persistence failures never fail the in-memory transition.
    async fn persist(&self, session: &Session) {
        if let Err(e) = self.repository.save(session).await {
            tracing::warn!(
                "[SessionStore] {}",
                SyncError::Persistence(format!("could not persist session: {}", e))
            );
        }
    }
}
