//! Composition root.
//!
//! Wires the session lifecycle to the poller lifecycle and feed changes to
//! the workflow coordinator:
//!
//! - a session appearing starts the poller;
//! - a session disappearing (or switching identity) stops and clears the
//!   poller, drops any unclaimed handoff and resets the workflow;
//! - every applied feed is offered to the coordinator for auto-prompting.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use portal_core::config::PortalSettings;
use portal_core::error::Result;
use portal_core::notification::{NotificationFeed, NotificationService};
use portal_core::session::{ProfileService, Session, SessionRepository};
use portal_core::workflow::HandoffSlot;

use crate::notification_poller::NotificationPoller;
use crate::screens::{EntryScreen, ProfileScreen};
use crate::session_store::{SessionSnapshot, SessionStore};
use crate::workflow_coordinator::WorkflowCoordinator;

/// Reacts to session changes. Shared with the watcher task.
struct Lifecycle {
    poller: Arc<NotificationPoller>,
    coordinator: Arc<WorkflowCoordinator>,
    handoff: Arc<HandoffSlot>,
    active_identity: Mutex<Option<String>>,
}

impl Lifecycle {
    async fn apply(&self, snapshot: &SessionSnapshot) {
        let identity = snapshot.identifier().map(str::to_string);

        let previous = {
            let mut active = self
                .active_identity
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if *active == identity {
                None
            } else {
                Some(std::mem::replace(&mut *active, identity.clone()))
            }
        };

        if let Some(Some(previous)) = previous {
            tracing::info!(identifier = %previous, "[Portal] Session ended, stopping notification polling");
            self.poller.clear();
            self.handoff.clear();
            self.coordinator.reset().await;
        }

        if identity.is_some() {
            self.poller.start();
        }
    }
}

pub struct Portal {
    session: Arc<SessionStore>,
    poller: Arc<NotificationPoller>,
    coordinator: Arc<WorkflowCoordinator>,
    handoff: Arc<HandoffSlot>,
    lifecycle: Arc<Lifecycle>,
    shutdown: CancellationToken,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl Portal {
    pub fn new(
        settings: &PortalSettings,
        profiles: Arc<dyn ProfileService>,
        notifications: Arc<dyn NotificationService>,
        repository: Arc<dyn SessionRepository>,
    ) -> Self {
        let session = Arc::new(SessionStore::new(profiles.clone(), repository));
        let poller = Arc::new(NotificationPoller::new(
            notifications,
            session.subscribe(),
            settings.polling.interval(),
        ));
        let handoff = Arc::new(HandoffSlot::new());
        let coordinator = WorkflowCoordinator::new(
            profiles,
            session.clone(),
            poller.clone(),
            handoff.clone(),
            &settings.workflow,
        );
        let lifecycle = Arc::new(Lifecycle {
            poller: poller.clone(),
            coordinator: coordinator.clone(),
            handoff: handoff.clone(),
            active_identity: Mutex::new(None),
        });

        Self {
            session,
            poller,
            coordinator,
            handoff,
            lifecycle,
            shutdown: CancellationToken::new(),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Builds a portal over a single backend implementing both services.
    pub fn with_backend<B>(
        settings: &PortalSettings,
        backend: Arc<B>,
        repository: Arc<dyn SessionRepository>,
    ) -> Self
    where
        B: ProfileService + NotificationService + 'static,
    {
        Self::new(settings, backend.clone(), backend, repository)
    }

    /// Starts the watchers and bootstraps the session.
    ///
    /// Returns the handle of the background profile refresh, if a persisted
    /// session was restored.
    pub async fn start(&self) -> Option<JoinHandle<()>> {
        let session_rx = self.session.subscribe();
        let feed_rx = self.poller.subscribe();
        {
            let mut watchers = self.watchers.lock().unwrap_or_else(|p| p.into_inner());
            watchers.push(tokio::spawn(watch_session(
                session_rx,
                self.lifecycle.clone(),
                self.shutdown.clone(),
            )));
            watchers.push(tokio::spawn(watch_feed(
                feed_rx,
                self.coordinator.clone(),
                self.shutdown.clone(),
            )));
        }

        let refresh = self.session.bootstrap().await;
        self.lifecycle.apply(&self.session.snapshot()).await;
        refresh
    }

    /// Logs in and starts polling for the new session.
    pub async fn login(&self, identifier: &str) -> Result<Session> {
        let session = self.session.login(identifier).await?;
        self.lifecycle.apply(&self.session.snapshot()).await;
        Ok(session)
    }

    /// Logs out and tears down polling and any workflow.
    pub async fn logout(&self) {
        self.session.logout().await;
        self.lifecycle.apply(&self.session.snapshot()).await;
    }

    /// Stops all background work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.poller.stop();
        let watchers = std::mem::take(&mut *self.watchers.lock().unwrap_or_else(|p| p.into_inner()));
        for watcher in watchers {
            watcher.abort();
        }
        tracing::debug!("[Portal] Shut down");
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn notifications(&self) -> &Arc<NotificationPoller> {
        &self.poller
    }

    pub fn workflow(&self) -> &Arc<WorkflowCoordinator> {
        &self.coordinator
    }

    pub fn entry_screen(&self) -> EntryScreen {
        EntryScreen::new(self.poller.clone(), self.coordinator.clone(), self.handoff.clone())
    }

    pub fn profile_screen(&self) -> ProfileScreen {
        ProfileScreen::new(self.session.clone(), self.coordinator.clone(), self.handoff.clone())
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.poller.stop();
    }
}

async fn watch_session(
    mut rx: watch::Receiver<SessionSnapshot>,
    lifecycle: Arc<Lifecycle>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let snapshot = rx.borrow_and_update().clone();
        lifecycle.apply(&snapshot).await;
    }
}

async fn watch_feed(
    mut rx: watch::Receiver<NotificationFeed>,
    coordinator: Arc<WorkflowCoordinator>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let feed = rx.borrow_and_update().clone();
        coordinator.observe_feed(&feed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemorySessionRepository, MockBackend, action_required, session, settle};
    use portal_core::workflow::WorkflowStep;
    use std::sync::atomic::Ordering;

    fn portal(backend: Arc<MockBackend>, repo: Arc<MemorySessionRepository>) -> Portal {
        Portal::with_backend(&PortalSettings::default(), backend, repo)
    }

    #[tokio::test]
    async fn test_login_starts_and_logout_stops_polling() {
        let backend = Arc::new(MockBackend::new().with_user("a@x.com", "Asha Rao"));
        backend.set_notifications(vec![action_required(1)]);
        let portal = portal(backend.clone(), Arc::new(MemorySessionRepository::default()));
        assert!(portal.start().await.is_none());
        assert!(!portal.notifications().is_running());

        portal.login("a@x.com").await.unwrap();
        settle().await;
        assert!(portal.notifications().is_running());
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(portal.workflow().step(), WorkflowStep::Prompted);

        portal.logout().await;
        assert!(!portal.notifications().is_running());
        assert!(portal.notifications().notifications().is_empty());
        assert_eq!(portal.workflow().step(), WorkflowStep::Idle);
    }

    #[tokio::test]
    async fn test_restored_session_starts_polling() {
        let backend = Arc::new(MockBackend::new());
        backend.add_user("a@x.com", "Asha Rao", None);
        let repo = Arc::new(MemorySessionRepository::with_session(session("a@x.com")));
        let portal = portal(backend.clone(), repo);

        let refresh = portal.start().await.unwrap();
        refresh.await.unwrap();
        settle().await;

        assert!(portal.notifications().is_running());
        assert!(backend.list_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_switching_identity_resets_workflow() {
        let backend = Arc::new(
            MockBackend::new()
                .with_user("a@x.com", "Asha Rao")
                .with_user("b@x.com", "Bea Singh"),
        );
        backend.set_notifications(vec![action_required(1)]);
        let portal = portal(backend, Arc::new(MemorySessionRepository::default()));
        portal.start().await;

        portal.login("a@x.com").await.unwrap();
        settle().await;
        assert_eq!(portal.workflow().step(), WorkflowStep::Prompted);
        portal.entry_screen().proceed().await.unwrap();

        portal.login("b@x.com").await.unwrap();
        settle().await;
        // The unclaimed handoff belonged to the previous user.
        let view = portal.profile_screen().mount().await;
        assert_eq!(view.user.unwrap().name, "Bea Singh");
        assert_eq!(view.mode, crate::screens::ProfileMode::ReadOnly);
    }
}
