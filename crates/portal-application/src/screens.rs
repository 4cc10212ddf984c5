//! Screen-level entry points used by the UI layer.
//!
//! The entry screen surfaces the prompt and the notification dropdown; the
//! profile screen is the target of the handoff.

use std::sync::Arc;

use portal_core::error::Result;
use portal_core::notification::{Notification, NotificationId, NotificationKind};
use portal_core::session::UserProfile;
use portal_core::workflow::{Handoff, HandoffSlot, WorkflowState};

use crate::notification_poller::NotificationPoller;
use crate::session_store::SessionStore;
use crate::workflow_coordinator::WorkflowCoordinator;

/// What opening a feed entry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedAction {
    /// An informational entry was marked read.
    MarkedRead,
    /// An action-required entry; navigate to the profile screen.
    Navigate(Handoff),
    /// Nothing to do (already read, or unknown id).
    None,
}

/// Overview screen: prompt modal, success banner and notification dropdown.
#[derive(Clone)]
pub struct EntryScreen {
    poller: Arc<NotificationPoller>,
    coordinator: Arc<WorkflowCoordinator>,
    handoff: Arc<HandoffSlot>,
}

impl EntryScreen {
    pub fn new(
        poller: Arc<NotificationPoller>,
        coordinator: Arc<WorkflowCoordinator>,
        handoff: Arc<HandoffSlot>,
    ) -> Self {
        Self {
            poller,
            coordinator,
            handoff,
        }
    }

    /// The notification the prompt modal is showing, if any.
    pub fn prompt(&self) -> Option<Notification> {
        match self.coordinator.state() {
            WorkflowState::Prompted { notification } => Some(notification),
            _ => None,
        }
    }

    pub async fn dismiss_prompt(&self) -> Result<NotificationId> {
        self.coordinator.dismiss_prompt().await
    }

    pub async fn proceed(&self) -> Result<Handoff> {
        self.coordinator.proceed().await
    }

    /// Handles a click on a dropdown entry.
    ///
    /// Informational entries are marked read on the spot. Action-required
    /// entries stay unread until their workflow completes.
    pub async fn open_notification(&self, id: NotificationId) -> Result<FeedAction> {
        let Some(notification) = self.poller.feed().get(id).cloned() else {
            tracing::debug!(notification_id = %id, "[EntryScreen] Unknown notification opened");
            return Ok(FeedAction::None);
        };

        match notification.kind {
            NotificationKind::Info if !notification.is_read => {
                self.poller.mark_read(id).await?;
                Ok(FeedAction::MarkedRead)
            }
            NotificationKind::ActionRequired if !notification.is_read => {
                let handoff = Handoff::enter(id);
                self.handoff.post(handoff);
                Ok(FeedAction::Navigate(handoff))
            }
            _ => Ok(FeedAction::None),
        }
    }

    pub async fn dismiss_banner(&self) {
        self.coordinator.dismiss_banner().await;
    }
}

/// How the profile screen renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMode {
    /// Plain data view, no action banner.
    ReadOnly,
    /// The acknowledgement banner is shown for this notification.
    Workflow(NotificationId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    pub user: Option<UserProfile>,
    pub mode: ProfileMode,
}

/// Target screen of the handoff.
#[derive(Clone)]
pub struct ProfileScreen {
    session: Arc<SessionStore>,
    coordinator: Arc<WorkflowCoordinator>,
    handoff: Arc<HandoffSlot>,
}

impl ProfileScreen {
    pub fn new(
        session: Arc<SessionStore>,
        coordinator: Arc<WorkflowCoordinator>,
        handoff: Arc<HandoffSlot>,
    ) -> Self {
        Self {
            session,
            coordinator,
            handoff,
        }
    }

    /// Mounts the screen, claiming any pending handoff.
    ///
    /// Without a usable handoff the screen shows the flow already in
    /// progress, if any, and is otherwise read-only. A handoff that cannot
    /// bind (another notification's flow is in progress) is dropped.
    pub async fn mount(&self) -> ProfileView {
        if let Some(handoff) = self.handoff.claim() {
            let id = handoff.notification_id;
            tracing::debug!(notification_id = %id, "[ProfileScreen] Claimed handoff");
            if let Err(e) = self.coordinator.begin_from_handoff(handoff).await {
                tracing::warn!(notification_id = %id, "[ProfileScreen] Handoff not bound: {}", e);
            }
        }

        let state = self.coordinator.state();
        let mode = match state.notification_id() {
            Some(id) if state.is_in_progress() => ProfileMode::Workflow(id),
            _ => ProfileMode::ReadOnly,
        };

        ProfileView {
            user: self.session.current_user(),
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemorySessionRepository, MockBackend, action_required, info};
    use portal_core::config::WorkflowSettings;
    use portal_core::notification::NotificationService;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Screens {
        backend: Arc<MockBackend>,
        poller: Arc<NotificationPoller>,
        entry: EntryScreen,
        profile: ProfileScreen,
    }

    async fn screens(items: Vec<Notification>) -> Screens {
        let backend = Arc::new(MockBackend::new().with_user("a@x.com", "Asha Rao"));
        backend.set_notifications(items);
        let session = Arc::new(SessionStore::new(
            backend.clone(),
            Arc::new(MemorySessionRepository::default()),
        ));
        session.login("a@x.com").await.unwrap();

        let notifications: Arc<dyn NotificationService> = backend.clone();
        let poller = Arc::new(NotificationPoller::new(
            notifications,
            session.subscribe(),
            Duration::from_secs(30),
        ));
        poller.refresh().await.unwrap();

        let handoff = Arc::new(HandoffSlot::new());
        let coordinator = WorkflowCoordinator::new(
            backend.clone(),
            session.clone(),
            poller.clone(),
            handoff.clone(),
            &WorkflowSettings::default(),
        );
        Screens {
            backend,
            poller: poller.clone(),
            entry: EntryScreen::new(poller, coordinator.clone(), handoff.clone()),
            profile: ProfileScreen::new(session, coordinator, handoff),
        }
    }

    #[tokio::test]
    async fn test_direct_visit_is_read_only() {
        let s = screens(vec![action_required(1)]).await;
        let view = s.profile.mount().await;
        assert_eq!(view.mode, ProfileMode::ReadOnly);
        assert_eq!(view.user.unwrap().name, "Asha Rao");
    }

    #[tokio::test]
    async fn test_handoff_is_consumed_once() {
        let s = screens(vec![action_required(1)]).await;

        let action = s.entry.open_notification(NotificationId(1)).await.unwrap();
        assert_eq!(action, FeedAction::Navigate(Handoff::enter(NotificationId(1))));
        // Action-required entries are not marked read by opening them
        assert_eq!(s.backend.mark_read_calls.load(Ordering::SeqCst), 0);

        let first = s.profile.mount().await;
        assert_eq!(first.mode, ProfileMode::Workflow(NotificationId(1)));

        // Re-mounting finds no handoff but resumes the flow in progress.
        let again = s.profile.mount().await;
        assert_eq!(again.mode, ProfileMode::Workflow(NotificationId(1)));
    }

    #[tokio::test]
    async fn test_handoff_for_other_notification_keeps_flow_in_progress() {
        let s = screens(vec![action_required(1), action_required(2)]).await;

        s.entry.open_notification(NotificationId(1)).await.unwrap();
        assert_eq!(s.profile.mount().await.mode, ProfileMode::Workflow(NotificationId(1)));

        // A second handoff cannot bind while the first flow is open.
        let action = s.entry.open_notification(NotificationId(2)).await.unwrap();
        assert_eq!(action, FeedAction::Navigate(Handoff::enter(NotificationId(2))));
        let view = s.profile.mount().await;
        assert_eq!(view.mode, ProfileMode::Workflow(NotificationId(1)));
        assert_eq!(view.user.unwrap().name, "Asha Rao");
        assert!(!s.entry.handoff.is_pending());
    }

    #[tokio::test]
    async fn test_info_entry_is_marked_read() {
        let s = screens(vec![info(3)]).await;

        let action = s.entry.open_notification(NotificationId(3)).await.unwrap();
        assert_eq!(action, FeedAction::MarkedRead);
        assert_eq!(s.poller.unread_count(), 0);

        let action = s.entry.open_notification(NotificationId(3)).await.unwrap();
        assert_eq!(action, FeedAction::None);
        assert_eq!(s.backend.mark_read_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prompt_then_proceed_reaches_profile() {
        let s = screens(vec![action_required(2)]).await;
        s.entry.proceed().await.unwrap_err();

        // Feed observation is normally wired by the portal.
        let coordinator = s.profile.coordinator.clone();
        coordinator.observe_feed(&s.poller.feed()).await;
        assert_eq!(s.entry.prompt().unwrap().id, NotificationId(2));

        s.entry.proceed().await.unwrap();
        assert!(s.entry.prompt().is_none());

        let view = s.profile.mount().await;
        assert_eq!(view.mode, ProfileMode::Workflow(NotificationId(2)));
    }
}
