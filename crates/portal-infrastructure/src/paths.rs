//! Path management for portal configuration and session files.
//!
//! ```text
//! ~/.config/employee-portal/     # Config directory (platform equivalent on macOS/Windows)
//! ├── config.toml                # PortalSettings
//! └── session.toml               # Persisted session (key: "user")
//! ```

use std::path::PathBuf;
use thiserror::Error;

const APP_DIR_NAME: &str = "employee-portal";
const CONFIG_FILE_NAME: &str = "config.toml";
const SESSION_FILE_NAME: &str = "session.toml";

/// Errors that can occur during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("Cannot find the user configuration directory")]
    ConfigDirNotFound,
}

impl From<PathError> for portal_core::PortalError {
    fn from(err: PathError) -> Self {
        portal_core::PortalError::config(err.to_string())
    }
}

/// Resolves where the portal keeps its files.
///
/// A base directory override is used by tests and by the `--config-dir` flag.
#[derive(Debug, Clone, Default)]
pub struct PortalPaths {
    base_override: Option<PathBuf>,
}

impl PortalPaths {
    pub fn new(base_override: Option<PathBuf>) -> Self {
        Self { base_override }
    }

    /// Returns the portal configuration directory.
    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        if let Some(base) = &self.base_override {
            return Ok(base.clone());
        }
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(PathError::ConfigDirNotFound)
    }

    pub fn config_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn session_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join(SESSION_FILE_NAME))
    }
}
