//! Error types for the portal engine.
//!
//! The taxonomy follows how failures are surfaced to the user:
//!
//! - [`AuthError`]: explicit login failed. Surfaced to the user.
//! - [`SyncError`]: a background refresh, retrieval or submission failed.
//!   Logged; previous state is retained.
//! - [`ValidationError`]: a submit action is blocked client-side. Never
//!   reaches the network.
//! - [`WorkflowError`]: an action was attempted in a workflow step that does
//!   not accept it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notification::NotificationId;

/// Failures reported by the remote backend collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// The requested resource does not exist (HTTP 404).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The bearer token was rejected (HTTP 401/403).
    #[error("Unauthorized")]
    Unauthorized,

    /// Any other non-success status.
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response (DNS, connect, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Explicit login failures.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    /// The backend does not know this identifier.
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    /// The backend could not be reached or answered with an error.
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered without issuing an identity token.
    #[error("Backend did not issue an identity token")]
    MissingToken,

    /// A later explicit login or logout won; this result was discarded.
    #[error("Login superseded by a later session change")]
    Superseded,
}

impl AuthError {
    /// Maps a backend failure observed during login.
    pub fn from_backend(identifier: &str, err: BackendError) -> Self {
        match err {
            BackendError::NotFound { .. } => Self::UnknownIdentifier(identifier.to_string()),
            other => Self::Unreachable(other.to_string()),
        }
    }
}

/// Non-fatal failures of background work.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncError {
    #[error("Profile refresh failed: {0}")]
    Profile(String),

    #[error("Notification retrieval failed: {0}")]
    Notifications(String),

    #[error("Marking notification {id} read failed: {message}")]
    MarkRead { id: NotificationId, message: String },

    #[error("Workflow submission failed: {0}")]
    Submission(String),

    #[error("Session persistence failed: {0}")]
    Persistence(String),
}

/// Client-side input checks that block a submit action.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("A rejection reason is required")]
    EmptyReason,

    #[error("Rejection reason is {actual} characters, maximum is {max}")]
    ReasonTooLong { max: usize, actual: usize },

    #[error("A confirmation file must be attached")]
    MissingEvidence,

    #[error("The confirmation file '{0}' is empty")]
    EmptyEvidence(String),

    #[error("The confirmation file is {actual} bytes, maximum is {max}")]
    EvidenceTooLarge { max: usize, actual: usize },
}

/// Illegal workflow actions. Serialize-only: step and action names are
/// static labels.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WorkflowError {
    /// A different notification is already bound to an incomplete workflow.
    #[error("Workflow already bound to notification {active}, cannot bind {requested}")]
    AlreadyBound {
        active: NotificationId,
        requested: NotificationId,
    },

    /// The action is not accepted in the current step.
    #[error("Cannot {action} while {step}")]
    InvalidTransition {
        step: &'static str,
        action: &'static str,
    },

    /// The notification is unknown, already read, or not action-required.
    #[error("Notification {0} does not require action")]
    NotActionable(NotificationId),

    /// The operation needs an authenticated session.
    #[error("No authenticated session")]
    NotAuthenticated,
}

/// Umbrella error for the portal engine.
#[derive(Error, Debug, Clone, Serialize)]
pub enum PortalError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortalError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_workflow(&self) -> bool {
        matches!(self, Self::Workflow(_))
    }

    /// Only login failures are meant to reach the user as an error message;
    /// everything else degrades to last-known-good state or blocks a button.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Validation(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for PortalError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for PortalError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, PortalError>`.
pub type Result<T> = std::result::Result<T, PortalError>;
