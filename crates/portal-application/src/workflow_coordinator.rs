//! Action workflow coordinator.
//!
//! Drives [`WorkflowState`] for one action-required notification at a time:
//! auto-prompts from the feed, binds from a screen handoff, submits the
//! acknowledgement or rejection, and shows the success banner.
//!
//! The state stays `Completed` while the banner is visible and returns to
//! `Idle` when the banner is dismissed or expires.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, watch};

use portal_core::config::WorkflowSettings;
use portal_core::error::{PortalError, Result, SyncError, WorkflowError};
use portal_core::notification::{NotificationFeed, NotificationId};
use portal_core::session::{ProfileService, ProfileUpdate};
use portal_core::workflow::{
    EvidenceFile, Handoff, HandoffSlot, Submission, WorkflowLimits, WorkflowOutcome, WorkflowState,
    WorkflowStep,
};

use crate::notification_poller::NotificationPoller;
use crate::session_store::SessionStore;

/// Transient confirmation shown after a workflow completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessBanner {
    pub notification_id: NotificationId,
    pub outcome: WorkflowOutcome,
    pub message: String,
}

impl SuccessBanner {
    fn new(notification_id: NotificationId, outcome: WorkflowOutcome) -> Self {
        let message = match &outcome {
            WorkflowOutcome::Acknowledged => "Bank details acknowledged. Thank you!".to_string(),
            WorkflowOutcome::Rejected { .. } => {
                "Your rejection has been sent to the administrator.".to_string()
            }
        };
        Self {
            notification_id,
            outcome,
            message,
        }
    }
}

#[derive(Debug, Default)]
struct CoordinatorInner {
    state: WorkflowState,
    /// Ids already auto-prompted; never prompted again.
    prompted: HashSet<NotificationId>,
    /// Ids whose workflow completed; a stale handoff cannot reopen them.
    completed: HashSet<NotificationId>,
}

pub struct WorkflowCoordinator {
    profiles: Arc<dyn ProfileService>,
    session: Arc<SessionStore>,
    poller: Arc<NotificationPoller>,
    handoff: Arc<HandoffSlot>,
    limits: WorkflowLimits,
    banner_duration: Duration,
    inner: Mutex<CoordinatorInner>,
    state: watch::Sender<WorkflowState>,
    banner: watch::Sender<Option<SuccessBanner>>,
    banner_seq: AtomicU64,
    this: Weak<WorkflowCoordinator>,
}

impl WorkflowCoordinator {
    pub fn new(
        profiles: Arc<dyn ProfileService>,
        session: Arc<SessionStore>,
        poller: Arc<NotificationPoller>,
        handoff: Arc<HandoffSlot>,
        settings: &WorkflowSettings,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(WorkflowState::Idle);
        let (banner, _) = watch::channel(None);
        Arc::new_cyclic(|this| Self {
            profiles,
            session,
            poller,
            handoff,
            limits: WorkflowLimits::from(settings),
            banner_duration: settings.success_banner_duration(),
            inner: Mutex::new(CoordinatorInner::default()),
            state,
            banner,
            banner_seq: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    // ============================================================================
    // Observers
    // ============================================================================

    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    pub fn step(&self) -> WorkflowStep {
        self.state.borrow().step()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    pub fn banner(&self) -> Option<SuccessBanner> {
        self.banner.borrow().clone()
    }

    pub fn subscribe_banner(&self) -> watch::Receiver<Option<SuccessBanner>> {
        self.banner.subscribe()
    }

    pub fn limits(&self) -> WorkflowLimits {
        self.limits
    }

    /// Whether the submit action should be enabled.
    pub fn can_submit(&self) -> bool {
        self.state.borrow().can_submit(self.limits)
    }

    fn publish(&self, inner: &CoordinatorInner) {
        self.state.send_if_modified(|current| {
            if *current == inner.state {
                return false;
            }
            *current = inner.state.clone();
            true
        });
    }

    /// Applies `transition` to the state under the lock and publishes it.
    async fn transition<T>(
        &self,
        transition: impl FnOnce(&mut WorkflowState) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.inner.lock().await;
        let before = inner.state.step();
        let value = transition(&mut inner.state)?;
        if inner.state.step() != before {
            tracing::info!(
                notification_id = ?inner.state.notification_id(),
                "[Workflow] {} -> {}",
                before,
                inner.state.step()
            );
        }
        self.publish(&inner);
        Ok(value)
    }

    // ============================================================================
    // Entry screen
    // ============================================================================

    /// Reacts to a new feed: prompts for the first unread action-required
    /// record unless a workflow is active or that id was already prompted.
    pub async fn observe_feed(&self, feed: &NotificationFeed) {
        let mut inner = self.inner.lock().await;

        // A prompt whose notification was read elsewhere is withdrawn.
        let withdrawn = match &inner.state {
            WorkflowState::Prompted { notification }
                if !feed.get(notification.id).is_some_and(|n| n.is_actionable()) =>
            {
                Some(notification.id)
            }
            _ => None,
        };
        if let Some(id) = withdrawn {
            tracing::debug!(
                notification_id = %id,
                "[Workflow] Withdrawing prompt for a notification no longer actionable"
            );
            inner.state = WorkflowState::Idle;
            self.publish(&inner);
        }

        if inner.state.is_active() {
            return;
        }

        let Some(candidate) = feed.action_required() else {
            return;
        };
        if inner.prompted.contains(&candidate.id) || inner.completed.contains(&candidate.id) {
            return;
        }

        let id = candidate.id;
        match inner.state.prompt(candidate.clone()) {
            Ok(()) => {
                inner.prompted.insert(id);
                tracing::info!(notification_id = %id, "[Workflow] Prompting for action-required notification");
                self.publish(&inner);
            }
            Err(e) => tracing::debug!(notification_id = %id, "[Workflow] Not prompting: {}", e),
        }
    }

    /// Closes the prompt without entering the flow. The id is not prompted again.
    pub async fn dismiss_prompt(&self) -> Result<NotificationId> {
        self.transition(|state| Ok(state.dismiss_prompt()?)).await
    }

    /// Closes the prompt and posts a handoff for the target screen.
    pub async fn proceed(&self) -> Result<Handoff> {
        let id = self.transition(|state| Ok(state.dismiss_prompt()?)).await?;
        let handoff = Handoff::enter(id);
        self.handoff.post(handoff);
        tracing::debug!(notification_id = %id, "[Workflow] Handoff posted");
        Ok(handoff)
    }

    // ============================================================================
    // Target screen
    // ============================================================================

    /// Binds the workflow from a claimed handoff.
    ///
    /// Returns `Ok(false)` when the handoff does not start a flow: entry was
    /// not intended, the workflow for that id already completed, or the
    /// notification is unknown or no longer actionable.
    pub async fn begin_from_handoff(&self, handoff: Handoff) -> Result<bool> {
        let id = handoff.notification_id;
        if !handoff.entry_intended {
            return Ok(false);
        }

        let mut inner = self.inner.lock().await;
        if inner.completed.contains(&id) {
            tracing::debug!(notification_id = %id, "[Workflow] Handoff for a completed workflow ignored");
            return Ok(false);
        }

        let actionable = self
            .poller
            .feed()
            .get(id)
            .is_some_and(|n| n.is_actionable());
        if !actionable {
            tracing::debug!(notification_id = %id, "[Workflow] Handoff for a notification that is not actionable ignored");
            return Ok(false);
        }

        inner.state.bind(id)?;
        inner.prompted.insert(id);
        tracing::info!(notification_id = %id, "[Workflow] Awaiting decision");
        self.publish(&inner);
        Ok(true)
    }

    pub async fn choose_acknowledge(&self) -> Result<()> {
        self.transition(|state| Ok(state.choose_acknowledge()?)).await
    }

    pub async fn choose_reject(&self) -> Result<()> {
        self.transition(|state| Ok(state.choose_reject()?)).await
    }

    /// Returns to the decision, discarding partial input.
    pub async fn back(&self) -> Result<()> {
        self.transition(|state| Ok(state.back()?)).await
    }

    pub async fn attach_evidence(&self, file: EvidenceFile) -> Result<()> {
        self.transition(|state| Ok(state.attach_evidence(file)?)).await
    }

    pub async fn set_reason(&self, text: &str) -> Result<()> {
        let max = self.limits.max_reason_chars;
        self.transition(|state| state.set_reason(text, max)).await
    }

    /// Acknowledges with `evidence`, choosing Acknowledge first if the
    /// decision is still open.
    pub async fn acknowledge(&self, evidence: EvidenceFile) -> Result<WorkflowOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.state.step() == WorkflowStep::AwaitingDecision {
            inner.state.choose_acknowledge()?;
        }
        let attached = inner.state.attach_evidence(evidence);
        self.publish(&inner);
        attached?;
        self.submit_locked(inner).await
    }

    /// Rejects with `reason`, choosing Reject first if the decision is still
    /// open.
    pub async fn reject(&self, reason: &str) -> Result<WorkflowOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.state.step() == WorkflowStep::AwaitingDecision {
            inner.state.choose_reject()?;
        }
        let entered = inner.state.set_reason(reason, self.limits.max_reason_chars);
        self.publish(&inner);
        entered?;
        self.submit_locked(inner).await
    }

    /// Submits the current evidence or reason.
    pub async fn submit(&self) -> Result<WorkflowOutcome> {
        let inner = self.inner.lock().await;
        self.submit_locked(inner).await
    }

    /// Validation happens before any network call. A failed profile update
    /// keeps the awaiting step and its input so the user can retry.
    async fn submit_locked(
        &self,
        mut inner: MutexGuard<'_, CoordinatorInner>,
    ) -> Result<WorkflowOutcome> {
        let submission = inner.state.prepare_submission(self.limits)?;
        let token = self.session.token().ok_or(WorkflowError::NotAuthenticated)?;
        let id = submission.notification_id();

        let update = match &submission {
            Submission::Acknowledge { evidence, .. } => ProfileUpdate::approve(evidence.to_payload()),
            Submission::Reject { reason, .. } => ProfileUpdate::reject(reason.clone()),
        };

        tracing::info!(notification_id = %id, "[Workflow] Submitting");
        if let Err(e) = self.profiles.update_profile(&token, &update).await {
            let err = SyncError::Submission(e.to_string());
            tracing::warn!(notification_id = %id, "[Workflow] {}", err);
            return Err(PortalError::from(err));
        }

        inner.state.complete(&submission)?;
        inner.completed.insert(id);
        self.publish(&inner);
        drop(inner);

        let outcome = submission.outcome();
        tracing::info!(notification_id = %id, outcome = ?outcome, "[Workflow] Completed");

        // The workflow completes even if this fails; the poller retries.
        if let Err(e) = self.poller.mark_read(id).await {
            tracing::debug!(notification_id = %id, "[Workflow] Mark read deferred: {}", e);
        }

        self.show_banner(id, outcome.clone());

        if outcome == WorkflowOutcome::Acknowledged
            && let Err(e) = self.session.refresh().await
        {
            tracing::warn!("[Workflow] Session refresh after acknowledgement failed: {}", e);
        }
        if let Err(e) = self.poller.refresh().await {
            tracing::debug!("[Workflow] Feed refresh after completion failed: {}", e);
        }

        Ok(outcome)
    }

    // ============================================================================
    // Success banner
    // ============================================================================

    fn show_banner(&self, id: NotificationId, outcome: WorkflowOutcome) {
        let seq = self.banner_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.banner.send_replace(Some(SuccessBanner::new(id, outcome)));

        let coordinator = self.this.clone();
        let duration = self.banner_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.expire_banner(seq).await;
            }
        });
    }

    /// Hides the banner before it expires.
    pub async fn dismiss_banner(&self) {
        let seq = self.banner_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.expire_banner(seq).await;
    }

    async fn expire_banner(&self, seq: u64) {
        if self.banner_seq.load(Ordering::SeqCst) != seq {
            return;
        }
        self.banner.send_if_modified(|banner| banner.take().is_some());

        let mut inner = self.inner.lock().await;
        if inner.state.step() == WorkflowStep::Completed
            && let Ok((id, _)) = inner.state.finish()
        {
            tracing::debug!(notification_id = %id, "[Workflow] Completed -> idle");
            self.publish(&inner);
        }
    }

    /// Drops any workflow, banner and prompt history (e.g. on logout).
    pub async fn reset(&self) {
        self.banner_seq.fetch_add(1, Ordering::SeqCst);
        self.banner.send_if_modified(|banner| banner.take().is_some());

        let mut inner = self.inner.lock().await;
        *inner = CoordinatorInner::default();
        self.publish(&inner);
        tracing::debug!("[Workflow] Reset");
    }
}
