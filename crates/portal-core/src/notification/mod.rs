//! Notification domain module.
//!
//! - `model`: `Notification` records and the `NotificationFeed` mirror with its
//!   derived views
//! - `service`: remote notification endpoints (`NotificationService`)

mod model;
mod service;

pub use model::{Notification, NotificationFeed, NotificationId, NotificationKind};
pub use service::NotificationService;
