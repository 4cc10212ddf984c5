//! In-memory backend and repository doubles shared by the unit and
//! scenario tests. Enabled outside this crate with the `test-util` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::oneshot;

use portal_core::error::{BackendError, Result};
use portal_core::notification::{Notification, NotificationId, NotificationKind, NotificationService};
use portal_core::session::{
    BankDetails, ProfileLookup, ProfileService, ProfileUpdate, ReportingLine, Session, SessionRepository,
    SessionToken, UserProfile,
};

pub fn profile(email: &str, name: &str) -> UserProfile {
    UserProfile {
        email: email.to_string(),
        name: name.to_string(),
        role: "Consultant".to_string(),
        avatar: "https://example.com/avatar.png".to_string(),
        phone: None,
        consultant_id: None,
        gender: None,
        dob: None,
        contract_start: None,
        contract_end: None,
        consultant_fee: None,
        reporting_to: ReportingLine::default(),
        bank_details: BankDetails::default(),
    }
}

pub fn session(email: &str) -> Session {
    Session::new(email, SessionToken::new(format!("token-{email}")), profile(email, "Paul Barber"))
}

pub fn notification(id: u64, kind: NotificationKind, is_read: bool) -> Notification {
    Notification {
        id: NotificationId(id),
        kind,
        title: format!("Notification {id}"),
        message: "message".to_string(),
        is_read,
        created_at: None,
    }
}

pub fn action_required(id: u64) -> Notification {
    notification(id, NotificationKind::ActionRequired, false)
}

pub fn info(id: u64) -> Notification {
    notification(id, NotificationKind::Info, false)
}

/// Scriptable stand-in for the REST backend.
///
/// `list_notifications` snapshots the server list when it is called, so a
/// gated call models a slow retrieval that returns stale data.
#[derive(Default)]
pub struct MockBackend {
    pub profiles: Mutex<HashMap<String, ProfileLookup>>,
    pub notifications: Mutex<Vec<Notification>>,
    pub updates: Mutex<Vec<ProfileUpdate>>,

    pub fetch_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub mark_read_calls: AtomicUsize,
    pub update_calls: AtomicUsize,

    pub fail_fetch: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_update: AtomicBool,
    /// Number of upcoming `mark_read` calls that fail.
    pub mark_read_failures: AtomicUsize,

    fetch_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    list_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    mark_read_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, email: &str, name: &str) -> Self {
        self.add_user(email, name, Some(&format!("token-{email}")));
        self
    }

    pub fn add_user(&self, email: &str, name: &str, token: Option<&str>) {
        self.profiles.lock().unwrap().insert(
            email.to_string(),
            ProfileLookup {
                profile: profile(email, name),
                token: token.map(SessionToken::new),
            },
        );
    }

    pub fn set_notifications(&self, items: Vec<Notification>) {
        *self.notifications.lock().unwrap() = items;
    }

    /// The next `fetch_profile` call waits for the returned sender.
    pub fn gate_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.fetch_gates.lock().unwrap().push_back(rx);
        tx
    }

    /// The next `list_notifications` call waits for the returned sender.
    pub fn gate_next_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.list_gates.lock().unwrap().push_back(rx);
        tx
    }

    /// The next `mark_read` call waits for the returned sender.
    pub fn gate_next_mark_read(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.mark_read_gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn server_is_read(&self, id: u64) -> bool {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .any(|n| n.id == NotificationId(id) && n.is_read)
    }
}

#[async_trait]
impl ProfileService for MockBackend {
    async fn fetch_profile(
        &self,
        identifier: &str,
        _token: Option<&SessionToken>,
    ) -> std::result::Result<ProfileLookup, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let lookup = self.profiles.lock().unwrap().get(identifier).cloned();
        let gate = self.fetch_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(BackendError::transport("connection refused"));
        }
        lookup.ok_or_else(|| BackendError::not_found(format!("profile '{identifier}'")))
    }

    async fn update_profile(
        &self,
        _token: &SessionToken,
        update: &ProfileUpdate,
    ) -> std::result::Result<(), BackendError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationService for MockBackend {
    async fn list_notifications(
        &self,
        _token: &SessionToken,
    ) -> std::result::Result<Vec<Notification>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.notifications.lock().unwrap().clone();
        let gate = self.list_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackendError::transport("timed out"));
        }
        Ok(snapshot)
    }

    async fn mark_read(
        &self,
        _token: &SessionToken,
        id: NotificationId,
    ) -> std::result::Result<(), BackendError> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.mark_read_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let should_fail = self
            .mark_read_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BackendError::transport("connection reset"));
        }
        let mut items = self.notifications.lock().unwrap();
        if let Some(item) = items.iter_mut().find(|n| n.id == id) {
            item.is_read = true;
        }
        Ok(())
    }
}

/// Session repository kept in memory.
#[derive(Default)]
pub struct MemorySessionRepository {
    pub stored: Mutex<Option<Session>>,
    pub save_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
}

impl MemorySessionRepository {
    pub fn with_session(session: Session) -> Self {
        Self {
            stored: Mutex::new(Some(session)),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Option<Session> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn load(&self) -> Result<Option<Session>> {
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        *self.stored.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        *self.stored.lock().unwrap() = None;
        Ok(())
    }
}

/// Lets spawned tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..25 {
        tokio::task::yield_now().await;
    }
}
