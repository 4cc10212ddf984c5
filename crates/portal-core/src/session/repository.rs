//! Session persistence trait.

use async_trait::async_trait;

use super::model::Session;
use crate::error::Result;

/// Fixed key under which the session is persisted.
pub const SESSION_STORAGE_KEY: &str = "user";

/// Persists the session across process restarts.
///
/// Implementations store at most one session under [`SESSION_STORAGE_KEY`].
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Returns the persisted session, if any.
    async fn load(&self) -> Result<Option<Session>>;

    /// Replaces the persisted session.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Removes the persisted session. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<()>;
}
