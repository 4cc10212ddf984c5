//! Notification feed poller.
//!
//! Keeps a local mirror of the backend's notification list for the current
//! session. Retrievals replace the mirror wholesale and are applied only if
//! they are newer (by issue order) than the last applied one, were issued
//! under the current generation, and the session they were issued for is
//! still the current one. `stop`/`clear` advance the generation; a cleared
//! or switched session is detected through the session receiver directly.
//!
//! `mark_read` is optimistic. Ids whose read flag the server has not yet
//! reported are tracked as pending reads and overlaid onto every retrieval;
//! failed requests are retried after the next successful retrieval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use portal_core::error::{PortalError, Result, SyncError};
use portal_core::notification::{Notification, NotificationFeed, NotificationId, NotificationService};
use portal_core::session::SessionToken;

use crate::session_store::SessionSnapshot;

/// What happened to a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// The result replaced the mirror.
    Applied,
    /// A retrieval issued later was applied first.
    Stale,
    /// The poller was stopped or cleared while the request was in flight.
    Discarded,
    /// No session, so nothing was requested.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRead {
    InFlight,
    Failed,
    /// The server accepted the request; retrievals issued up to and
    /// including `through_seq` may still predate it.
    Confirmed { through_seq: u64 },
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PollerInner {
    generation: u64,
    issued_seq: u64,
    applied_seq: u64,
    pending_reads: HashMap<NotificationId, PendingRead>,
    task: Option<PollTask>,
}

pub struct NotificationPoller {
    service: Arc<dyn NotificationService>,
    session: watch::Receiver<SessionSnapshot>,
    interval: Duration,
    feed: watch::Sender<NotificationFeed>,
    inner: Mutex<PollerInner>,
}

impl NotificationPoller {
    pub fn new(
        service: Arc<dyn NotificationService>,
        session: watch::Receiver<SessionSnapshot>,
        interval: Duration,
    ) -> Self {
        let (feed, _) = watch::channel(NotificationFeed::default());
        Self {
            service,
            session,
            interval,
            feed,
            inner: Mutex::new(PollerInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PollerInner> {
        // Never held across an await; a poisoned guard still holds valid state.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Identifier and token of the current session, captured at issue time.
    fn current_credentials(&self) -> Option<(String, SessionToken)> {
        let snapshot = self.session.borrow();
        let session = snapshot.session.as_ref()?;
        Some((session.identifier.clone(), session.token.clone()))
    }

    /// Whether `identifier` is still the logged-in identity. A refreshed
    /// token for the same identity still matches.
    fn session_is(&self, identifier: &str) -> bool {
        self.session.borrow().identifier() == Some(identifier)
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    /// Starts periodic retrieval. The first retrieval happens immediately.
    /// Calling `start` while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut inner = self.lock();
        if inner.task.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            tracing::debug!("[NotificationPoller] Already running");
            return;
        }

        let cancel = CancellationToken::new();
        let poller = Arc::clone(self);
        let token = cancel.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            tracing::info!("[NotificationPoller] Started ({}s interval)", period.as_secs());

            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = async {
                    // Failures are logged inside `retrieve`.
                    let _ = poller.retrieve().await;

                    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        tracing::debug!("[NotificationPoller] Tick");
                        let _ = poller.retrieve().await;
                    }
                } => {}
            }

            tracing::info!("[NotificationPoller] Stopped");
        });

        inner.task = Some(PollTask { cancel, handle });
    }

    /// Cancels periodic retrieval. Results of retrievals still in flight
    /// are discarded when they arrive.
    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            task.cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished() && !task.cancel.is_cancelled())
    }

    /// Stops polling and forgets the mirror and all pending reads.
    pub fn clear(&self) {
        self.stop();
        {
            let mut inner = self.lock();
            inner.pending_reads.clear();
            inner.applied_seq = inner.issued_seq;
        }
        self.feed.send_if_modified(|feed| {
            let changed = !feed.is_empty();
            *feed = NotificationFeed::default();
            changed
        });
    }

    // ============================================================================
    // Retrieval
    // ============================================================================

    /// Retrieves immediately without disturbing the periodic schedule.
    pub async fn refresh(self: &Arc<Self>) -> Result<RetrievalOutcome> {
        self.retrieve().await
    }

    async fn retrieve(self: &Arc<Self>) -> Result<RetrievalOutcome> {
        let Some((identifier, token)) = self.current_credentials() else {
            tracing::debug!("[NotificationPoller] No session, skipping retrieval");
            return Ok(RetrievalOutcome::Skipped);
        };

        let (seq, generation) = {
            let mut inner = self.lock();
            inner.issued_seq += 1;
            (inner.issued_seq, inner.generation)
        };

        let result = self.service.list_notifications(&token).await;

        let mut retries = Vec::new();
        let outcome = {
            let mut inner = self.lock();
            if inner.generation != generation || !self.session_is(&identifier) {
                tracing::debug!(seq, "[NotificationPoller] Discarding retrieval from a previous session");
                return Ok(RetrievalOutcome::Discarded);
            }

            let items = match result {
                Ok(items) => items,
                Err(e) => {
                    let err = SyncError::Notifications(e.to_string());
                    tracing::warn!(seq, "[NotificationPoller] {}", err);
                    return Err(PortalError::from(err));
                }
            };

            if seq <= inner.applied_seq {
                tracing::debug!(
                    seq,
                    applied = inner.applied_seq,
                    "[NotificationPoller] Ignoring stale retrieval"
                );
                RetrievalOutcome::Stale
            } else {
                inner.applied_seq = seq;
                let items = reconcile(&mut inner.pending_reads, items, seq, &mut retries);
                let feed = NotificationFeed::new(items);
                tracing::debug!(
                    seq,
                    total = feed.items().len(),
                    unread = feed.unread_count(),
                    "[NotificationPoller] Applied retrieval"
                );
                self.feed.send_if_modified(|current| {
                    let changed = *current != feed;
                    *current = feed;
                    changed
                });
                RetrievalOutcome::Applied
            }
        };

        for id in retries {
            let poller = Arc::clone(self);
            tokio::spawn(async move {
                // Logged inside `send_mark_read`.
                let _ = poller.send_mark_read(id, generation).await;
            });
        }

        Ok(outcome)
    }

    // ============================================================================
    // Mark read
    // ============================================================================

    /// Marks `id` read locally right away, then on the server.
    ///
    /// Repeated calls while a request is in flight, or after the server has
    /// accepted one, make no further network calls. A failed request keeps
    /// the local flag and is retried after the next successful retrieval.
    pub async fn mark_read(&self, id: NotificationId) -> Result<()> {
        self.feed.send_if_modified(|feed| feed.mark_read(id));

        let generation = {
            let mut inner = self.lock();
            match inner.pending_reads.get(&id) {
                Some(PendingRead::InFlight) | Some(PendingRead::Confirmed { .. }) => {
                    tracing::debug!(notification_id = %id, "[NotificationPoller] Mark read already sent");
                    return Ok(());
                }
                Some(PendingRead::Failed) | None => {}
            }
            inner.generation
        };

        self.send_mark_read(id, generation).await
    }

    async fn send_mark_read(&self, id: NotificationId, generation: u64) -> Result<()> {
        let Some((identifier, token)) = self.current_credentials() else {
            tracing::debug!(notification_id = %id, "[NotificationPoller] No session, not marking read");
            return Ok(());
        };

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return Ok(());
            }
            inner.pending_reads.insert(id, PendingRead::InFlight);
        }

        let result = self.service.mark_read(&token, id).await;

        let mut inner = self.lock();
        if inner.generation != generation || !self.session_is(&identifier) {
            tracing::debug!(notification_id = %id, "[NotificationPoller] Session changed, dropping mark read result");
            inner.pending_reads.remove(&id);
            return Ok(());
        }
        match result {
            Ok(()) => {
                let through_seq = inner.issued_seq;
                inner
                    .pending_reads
                    .insert(id, PendingRead::Confirmed { through_seq });
                tracing::debug!(notification_id = %id, "[NotificationPoller] Marked read");
                Ok(())
            }
            Err(e) => {
                inner.pending_reads.insert(id, PendingRead::Failed);
                let err = SyncError::MarkRead {
                    id,
                    message: e.to_string(),
                };
                tracing::warn!(notification_id = %id, "[NotificationPoller] {}, will retry after next retrieval", err);
                Err(err.into())
            }
        }
    }

    // ============================================================================
    // Derived views
    // ============================================================================

    pub fn subscribe(&self) -> watch::Receiver<NotificationFeed> {
        self.feed.subscribe()
    }

    pub fn feed(&self) -> NotificationFeed {
        self.feed.borrow().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.feed.borrow().items().to_vec()
    }

    pub fn unread_count(&self) -> usize {
        self.feed.borrow().unread_count()
    }

    /// Unread records in feed order.
    pub fn unread_notifications(&self) -> Vec<Notification> {
        self.feed.borrow().unread().cloned().collect()
    }

    /// The first unread action-required record in feed order.
    pub fn action_required_notification(&self) -> Option<Notification> {
        self.feed.borrow().action_required().cloned()
    }

    /// Ids read locally that the server has not yet reported read.
    pub fn pending_read_ids(&self) -> Vec<NotificationId> {
        let mut ids: Vec<_> = self.lock().pending_reads.keys().copied().collect();
        ids.sort();
        ids
    }
}

/// Overlays pending reads onto a fresh retrieval and settles the ones the
/// server has caught up with. Ids whose request failed, or which the server
/// still reports unread after confirming, are pushed onto `retries` and
/// marked in flight.
fn reconcile(
    pending: &mut HashMap<NotificationId, PendingRead>,
    mut items: Vec<Notification>,
    seq: u64,
    retries: &mut Vec<NotificationId>,
) -> Vec<Notification> {
    pending.retain(|id, state| {
        let Some(item) = items.iter_mut().find(|n| n.id == *id) else {
            return false;
        };
        if item.is_read {
            return false;
        }
        item.is_read = true;

        let needs_retry = match *state {
            PendingRead::InFlight => false,
            PendingRead::Failed => true,
            PendingRead::Confirmed { through_seq } => seq > through_seq,
        };
        if needs_retry {
            *state = PendingRead::InFlight;
            retries.push(*id);
        }
        true
    });
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockBackend, action_required, info, session, settle};
    use std::sync::atomic::Ordering;

    fn poller_with(backend: Arc<MockBackend>, authenticated: bool) -> (Arc<NotificationPoller>, watch::Sender<SessionSnapshot>) {
        let (tx, rx) = watch::channel(SessionSnapshot {
            session: authenticated.then(|| session("a@x.com")),
            is_bootstrapping: false,
        });
        let poller = Arc::new(NotificationPoller::new(backend, rx, Duration::from_secs(30)));
        (poller, tx)
    }

    #[tokio::test]
    async fn test_retrieval_without_session_is_skipped() {
        let backend = Arc::new(MockBackend::new());
        let (poller, _tx) = poller_with(backend.clone(), false);

        assert_eq!(poller.refresh().await.unwrap(), RetrievalOutcome::Skipped);
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_derived_views() {
        let backend = Arc::new(MockBackend::new());
        let mut read_action = action_required(1);
        read_action.is_read = true;
        backend.set_notifications(vec![info(5), read_action, action_required(2), action_required(3)]);
        let (poller, _tx) = poller_with(backend, true);

        poller.refresh().await.unwrap();

        assert_eq!(poller.notifications().len(), 4);
        assert_eq!(poller.unread_count(), 3);
        assert_eq!(
            poller.unread_notifications().iter().map(|n| n.id.0).collect::<Vec<_>>(),
            vec![5, 2, 3]
        );
        assert_eq!(poller.action_required_notification().unwrap().id, NotificationId(2));
    }

    #[tokio::test]
    async fn test_retrieval_failure_keeps_previous_mirror() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![info(1)]);
        let (poller, _tx) = poller_with(backend.clone(), true);
        poller.refresh().await.unwrap();

        backend.fail_list.store(true, Ordering::SeqCst);
        let err = poller.refresh().await.unwrap_err();
        assert!(matches!(err, PortalError::Sync(SyncError::Notifications(_))));
        assert_eq!(poller.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_completion_keeps_newest_issued() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![info(1)]);
        let (poller, _tx) = poller_with(backend.clone(), true);

        let slow_gate = backend.gate_next_list();
        let slow = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.refresh().await })
        };
        settle().await;

        // The server changes, then a newer retrieval completes first.
        backend.set_notifications(vec![info(1), info(2)]);
        assert_eq!(poller.refresh().await.unwrap(), RetrievalOutcome::Applied);

        slow_gate.send(()).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), RetrievalOutcome::Stale);
        assert_eq!(poller.notifications().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_result() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![action_required(1)]);
        let (poller, _tx) = poller_with(backend.clone(), true);

        let gate = backend.gate_next_list();
        let in_flight = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.refresh().await })
        };
        settle().await;

        poller.clear();
        gate.send(()).unwrap();

        assert_eq!(in_flight.await.unwrap().unwrap(), RetrievalOutcome::Discarded);
        assert!(poller.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_discarded_when_session_cleared() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![action_required(1)]);
        let (poller, tx) = poller_with(backend.clone(), true);

        let gate = backend.gate_next_list();
        let in_flight = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.refresh().await })
        };
        settle().await;

        tx.send_modify(|snapshot| snapshot.session = None);
        gate.send(()).unwrap();

        assert_eq!(in_flight.await.unwrap().unwrap(), RetrievalOutcome::Discarded);
        assert!(poller.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_discarded_after_identity_switch() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![action_required(1)]);
        let (poller, tx) = poller_with(backend.clone(), true);

        let gate = backend.gate_next_list();
        let in_flight = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.refresh().await })
        };
        settle().await;

        tx.send_modify(|snapshot| snapshot.session = Some(session("b@x.com")));
        gate.send(()).unwrap();

        assert_eq!(in_flight.await.unwrap().unwrap(), RetrievalOutcome::Discarded);
        assert!(poller.notifications().is_empty());

        // The new identity's own retrieval applies normally.
        backend.set_notifications(vec![info(7)]);
        assert_eq!(poller.refresh().await.unwrap(), RetrievalOutcome::Applied);
        assert_eq!(poller.notifications()[0].id, NotificationId(7));
    }

    #[tokio::test]
    async fn test_mark_read_result_dropped_when_session_cleared() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![info(1)]);
        let (poller, tx) = poller_with(backend.clone(), true);
        poller.refresh().await.unwrap();

        backend.mark_read_failures.store(1, Ordering::SeqCst);
        let gate = backend.gate_next_mark_read();
        let in_flight = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.mark_read(NotificationId(1)).await })
        };
        settle().await;
        assert_eq!(poller.pending_read_ids(), vec![NotificationId(1)]);

        tx.send_modify(|snapshot| snapshot.session = None);
        gate.send(()).unwrap();

        // The failure belongs to the previous session and is not retried.
        in_flight.await.unwrap().unwrap();
        assert!(poller.pending_read_ids().is_empty());
    }

    #[tokio::test]
    async fn test_start_retrieves_immediately() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![info(1), info(2)]);
        let (poller, _tx) = poller_with(backend.clone(), true);

        poller.start();
        settle().await;

        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(poller.unread_count(), 2);
        poller.stop();
    }

    #[tokio::test]
    async fn test_mark_read_is_optimistic_and_idempotent() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![info(1), info(2)]);
        let (poller, _tx) = poller_with(backend.clone(), true);
        poller.refresh().await.unwrap();

        poller.mark_read(NotificationId(1)).await.unwrap();
        poller.mark_read(NotificationId(1)).await.unwrap();

        assert_eq!(poller.unread_count(), 1);
        assert_eq!(backend.mark_read_calls.load(Ordering::SeqCst), 1);
        assert!(backend.server_is_read(1));

        // Once the server reports it read, the pending entry is settled.
        poller.refresh().await.unwrap();
        assert!(poller.pending_read_ids().is_empty());
    }

    #[tokio::test]
    async fn test_failed_mark_read_is_overlaid_and_retried() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![info(1)]);
        let (poller, _tx) = poller_with(backend.clone(), true);
        poller.refresh().await.unwrap();

        backend.mark_read_failures.store(1, Ordering::SeqCst);
        let err = poller.mark_read(NotificationId(1)).await.unwrap_err();
        assert!(matches!(err, PortalError::Sync(SyncError::MarkRead { .. })));
        // No rollback
        assert_eq!(poller.unread_count(), 0);

        // The server still says unread; the mirror keeps the local flag and
        // the request is retried in the background.
        poller.refresh().await.unwrap();
        assert_eq!(poller.unread_count(), 0);
        settle().await;

        assert_eq!(backend.mark_read_calls.load(Ordering::SeqCst), 2);
        assert!(backend.server_is_read(1));

        poller.refresh().await.unwrap();
        assert!(poller.pending_read_ids().is_empty());
        assert_eq!(poller.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_retrieval_does_not_undo_mark_read() {
        let backend = Arc::new(MockBackend::new());
        backend.set_notifications(vec![action_required(1)]);
        let (poller, _tx) = poller_with(backend.clone(), true);
        poller.refresh().await.unwrap();

        // Issued before the mark-read reaches the server.
        let gate = backend.gate_next_list();
        let early = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.refresh().await })
        };
        settle().await;

        poller.mark_read(NotificationId(1)).await.unwrap();
        gate.send(()).unwrap();
        assert_eq!(early.await.unwrap().unwrap(), RetrievalOutcome::Applied);

        assert!(poller.action_required_notification().is_none());
        assert_eq!(backend.mark_read_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_schedule() {
        let backend = Arc::new(MockBackend::new());
        let (poller, _tx) = poller_with(backend.clone(), true);

        poller.start();
        poller.start();
        settle().await;
        assert!(poller.is_running());
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);

        // Out-of-band refresh does not shift the schedule
        poller.refresh().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 4);

        poller.stop();
        assert!(!poller.is_running());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 4);
    }
}
