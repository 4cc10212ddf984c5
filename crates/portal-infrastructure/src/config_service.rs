//! Configuration service implementation.
//!
//! Loads [`PortalSettings`] from `config.toml` and layers environment
//! overrides on top:
//!
//! | Variable                     | Overrides                 |
//! |------------------------------|---------------------------|
//! | `PORTAL_CONFIG`              | path of the config file   |
//! | `PORTAL_API_URL`             | `backend.base_url`        |
//! | `PORTAL_POLL_INTERVAL_SECS`  | `polling.interval_secs`   |

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use portal_core::config::PortalSettings;
use portal_core::error::{PortalError, Result};

use crate::paths::PortalPaths;

pub const ENV_CONFIG_PATH: &str = "PORTAL_CONFIG";
pub const ENV_API_URL: &str = "PORTAL_API_URL";
pub const ENV_POLL_INTERVAL_SECS: &str = "PORTAL_POLL_INTERVAL_SECS";

/// Loads and caches the portal settings.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached settings, filled on first access.
    config: Arc<RwLock<Option<PortalSettings>>>,
}

impl ConfigService {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Resolves the config file from `PORTAL_CONFIG`, falling back to
    /// `<config_dir>/config.toml`.
    pub fn from_paths(paths: &PortalPaths) -> Result<Self> {
        let path = match std::env::var_os(ENV_CONFIG_PATH) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => paths.config_file()?,
        };
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the settings, reading the file on first access.
    pub fn get_config(&self) -> Result<PortalSettings> {
        {
            let read_lock = self.config.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = read_lock.as_ref() {
                return Ok(cached.clone());
            }
        }

        let mut loaded = Self::load_file(&self.path)?;
        apply_overrides(&mut loaded, |key| std::env::var(key).ok());

        let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
        *write_lock = Some(loaded.clone());
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
        *write_lock = None;
    }

    fn load_file(path: &Path) -> Result<PortalSettings> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "[ConfigService] No config at {}, using defaults",
                    path.display()
                );
                return Ok(PortalSettings::default());
            }
            Err(e) => {
                return Err(PortalError::config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        toml::from_str(&content)
            .map_err(|e| PortalError::config(format!("Invalid {}: {}", path.display(), e)))
    }
}

/// Applies environment overrides using `lookup` to read variables.
///
/// Unparseable values are ignored with a warning.
pub fn apply_overrides<F>(settings: &mut PortalSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_API_URL)
        && !url.trim().is_empty()
    {
        settings.backend.base_url = url.trim().trim_end_matches('/').to_string();
    }

    if let Some(raw) = lookup(ENV_POLL_INTERVAL_SECS) {
        match raw.trim().parse::<u64>() {
            Ok(secs) => settings.polling.interval_secs = secs,
            Err(_) => tracing::warn!(
                "[ConfigService] Ignoring {}={:?}: not a number of seconds",
                ENV_POLL_INTERVAL_SECS,
                raw
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = ConfigService::load_file(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, PortalSettings::default());
    }

    #[test]
    fn test_file_values_are_read_and_cached() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[backend]\nbase_url = \"https://portal.example.com/api\"\n\n[polling]\ninterval_secs = 45\n",
        )
        .unwrap();

        let service = ConfigService::new(path.clone());
        let first = service.get_config().unwrap();
        assert_eq!(first.backend.base_url, "https://portal.example.com/api");

        // Cached until invalidated
        std::fs::write(&path, "[polling]\ninterval_secs = 90\n").unwrap();
        assert_eq!(service.get_config().unwrap(), first);

        service.invalidate_cache();
        let reloaded = service.get_config().unwrap();
        assert_ne!(reloaded, first);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[polling]\ninterval_secs = \"soon\"\n").unwrap();

        let err = ConfigService::new(path).get_config().unwrap_err();
        assert!(matches!(err, PortalError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = PortalSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                (ENV_API_URL, "https://staging.example.com/api/"),
                (ENV_POLL_INTERVAL_SECS, "5"),
            ]),
        );
        assert_eq!(settings.backend.base_url, "https://staging.example.com/api");
        assert_eq!(settings.polling.interval_secs, 5);
    }

    #[test]
    fn test_bad_env_values_are_ignored() {
        let mut settings = PortalSettings::default();
        apply_overrides(
            &mut settings,
            env(&[(ENV_API_URL, "  "), (ENV_POLL_INTERVAL_SECS, "often")]),
        );
        assert_eq!(settings, PortalSettings::default());
    }
}
