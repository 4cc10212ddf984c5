//! Persistence DTOs.

mod session;

pub use session::{PersistedSessionV1, SESSION_FILE_VERSION, SessionFileDTO};
