//! Remote notification service trait.

use async_trait::async_trait;

use super::model::{Notification, NotificationId};
use crate::error::BackendError;
use crate::session::SessionToken;

/// Notification endpoints of the backend.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// `GET /notifications`, in feed order.
    async fn list_notifications(
        &self,
        token: &SessionToken,
    ) -> Result<Vec<Notification>, BackendError>;

    /// `PATCH /notifications/{id}` with `{ "read": true }`.
    async fn mark_read(&self, token: &SessionToken, id: NotificationId)
    -> Result<(), BackendError>;
}
