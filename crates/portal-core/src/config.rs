//! Settings for the portal engine.
//!
//! Loaded from `config.toml` by the infrastructure `ConfigService`. Every field
//! has a default so an absent or partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SUCCESS_BANNER_SECS: u64 = 5;
pub const DEFAULT_MAX_REASON_CHARS: usize = 300;
pub const DEFAULT_MAX_EVIDENCE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct PortalSettings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub workflow: WorkflowSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Where the REST backend lives and how long to wait for it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct BackendSettings {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PollingSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl PollingSettings {
    /// Polling interval, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    #[serde(default = "default_success_banner_secs")]
    pub success_banner_secs: u64,
    #[serde(default = "default_max_reason_chars")]
    pub max_reason_chars: usize,
    #[serde(default = "default_max_evidence_bytes")]
    pub max_evidence_bytes: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            success_banner_secs: DEFAULT_SUCCESS_BANNER_SECS,
            max_reason_chars: DEFAULT_MAX_REASON_CHARS,
            max_evidence_bytes: DEFAULT_MAX_EVIDENCE_BYTES,
        }
    }
}

impl WorkflowSettings {
    pub fn success_banner_duration(&self) -> Duration {
        Duration::from_secs(self.success_banner_secs)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct StorageSettings {
    /// Overrides the default session file location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_success_banner_secs() -> u64 {
    DEFAULT_SUCCESS_BANNER_SECS
}

fn default_max_reason_chars() -> usize {
    DEFAULT_MAX_REASON_CHARS
}

fn default_max_evidence_bytes() -> usize {
    DEFAULT_MAX_EVIDENCE_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let settings: PortalSettings = toml::from_str("").unwrap();
        assert_eq!(settings, PortalSettings::default());
        assert_eq!(settings.polling.interval(), Duration::from_secs(30));
        assert_eq!(settings.workflow.success_banner_duration(), Duration::from_secs(5));
        assert_eq!(settings.workflow.max_reason_chars, 300);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let settings: PortalSettings = toml::from_str(
            r#"
            [backend]
            base_url = "https://portal.example.com/api"

            [polling]
            interval_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(settings.backend.base_url, "https://portal.example.com/api");
        assert_eq!(settings.backend.timeout_secs, DEFAULT_TIMEOUT_SECS);
        // Zero is clamped so the ticker never spins.
        assert_eq!(settings.polling.interval(), Duration::from_secs(1));
        assert!(settings.storage.session_file.is_none());
    }
}
