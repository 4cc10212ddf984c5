//! On-disk representation of the persisted session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portal_core::session::{Session, SessionToken, UserProfile};

pub const SESSION_FILE_VERSION: u32 = 1;

/// The whole session file. The session lives under the fixed
/// [`portal_core::session::SESSION_STORAGE_KEY`] (`user`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFileDTO {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<PersistedSessionV1>,
}

/// Session record V1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSessionV1 {
    pub identifier: String,
    pub token: String,
    pub fetched_at: DateTime<Utc>,
    // Tables last so the TOML serializer can emit them after plain values.
    pub profile: UserProfile,
}

impl SessionFileDTO {
    pub fn with_session(session: &Session) -> Self {
        Self {
            version: SESSION_FILE_VERSION,
            user: Some(PersistedSessionV1::from(session)),
        }
    }
}

impl From<&Session> for PersistedSessionV1 {
    fn from(session: &Session) -> Self {
        Self {
            identifier: session.identifier.clone(),
            token: session.token.as_str().to_string(),
            fetched_at: session.fetched_at,
            profile: session.user.clone(),
        }
    }
}

impl From<PersistedSessionV1> for Session {
    fn from(dto: PersistedSessionV1) -> Self {
        Session {
            identifier: dto.identifier,
            token: SessionToken::new(dto.token),
            user: dto.profile,
            fetched_at: dto.fetched_at,
        }
    }
}
