//! Application layer for the employee portal.
//!
//! Session store, notification poller, workflow coordinator and the screen
//! entry points, composed by [`Portal`].

pub mod notification_poller;
pub mod portal;
pub mod screens;
pub mod session_store;
pub mod workflow_coordinator;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use notification_poller::{NotificationPoller, RetrievalOutcome};
pub use portal::Portal;
pub use screens::{EntryScreen, FeedAction, ProfileMode, ProfileScreen, ProfileView};
pub use session_store::{RefreshOutcome, SessionSnapshot, SessionStore};
pub use workflow_coordinator::{SuccessBanner, WorkflowCoordinator};
