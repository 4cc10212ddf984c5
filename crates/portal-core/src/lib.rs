//! Domain core of the employee portal client.
//!
//! Models, error taxonomy, settings, the pure acknowledgment state machine, and
//! the async traits through which the application layer reaches the backend
//! and local storage.

pub mod config;
pub mod error;
pub mod notification;
pub mod session;
pub mod workflow;

// Re-export common error type
pub use error::PortalError;
