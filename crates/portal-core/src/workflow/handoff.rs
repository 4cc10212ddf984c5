//! One-shot workflow intent carried across a screen transition.
//!
//! The entry screen posts a [`Handoff`] at the moment it navigates; the target
//! screen claims it exactly once when it mounts. A target screen reached any
//! other way finds the slot empty and behaves as a plain data view.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::notification::NotificationId;

/// Which notification triggered the flow, and whether the user asked to
/// enter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub notification_id: NotificationId,
    pub entry_intended: bool,
}

impl Handoff {
    pub fn enter(notification_id: NotificationId) -> Self {
        Self {
            notification_id,
            entry_intended: true,
        }
    }
}

/// Holds at most one unclaimed [`Handoff`].
#[derive(Debug, Default)]
pub struct HandoffSlot {
    pending: Mutex<Option<Handoff>>,
}

impl HandoffSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a payload to the next navigation. Returns any unclaimed
    /// payload it replaced.
    pub fn post(&self, handoff: Handoff) -> Option<Handoff> {
        self.lock().replace(handoff)
    }

    /// Takes the payload. A second claim returns `None`.
    pub fn claim(&self) -> Option<Handoff> {
        self.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    /// Drops any unclaimed payload (e.g. on logout).
    pub fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Handoff>> {
        // The guarded value is a plain Option; a poisoned lock is still usable.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_one_shot() {
        let slot = HandoffSlot::new();
        assert!(slot.claim().is_none());

        slot.post(Handoff::enter(NotificationId(4)));
        assert!(slot.is_pending());
        assert_eq!(slot.claim(), Some(Handoff::enter(NotificationId(4))));
        assert!(slot.claim().is_none());
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_post_replaces_unclaimed_payload() {
        let slot = HandoffSlot::new();
        assert!(slot.post(Handoff::enter(NotificationId(1))).is_none());
        assert_eq!(
            slot.post(Handoff::enter(NotificationId(2))),
            Some(Handoff::enter(NotificationId(1)))
        );
        assert_eq!(slot.claim().map(|h| h.notification_id), Some(NotificationId(2)));
    }

    #[test]
    fn test_clear() {
        let slot = HandoffSlot::new();
        slot.post(Handoff::enter(NotificationId(1)));
        slot.clear();
        assert!(slot.claim().is_none());
    }
}
