//! File-backed session persistence.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use portal_core::config::StorageSettings;
use portal_core::error::{PortalError, Result};
use portal_core::session::{Session, SessionRepository};

use crate::dto::{SESSION_FILE_VERSION, SessionFileDTO};
use crate::paths::PortalPaths;
use crate::storage::AtomicTomlFile;

/// Persists the session as `session.toml` under the `user` key.
///
/// File I/O runs on the blocking pool so callers on the async runtime are
/// never stalled by disk latency.
#[derive(Clone)]
pub struct FileSessionRepository {
    file: Arc<AtomicTomlFile<SessionFileDTO>>,
}

impl FileSessionRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: Arc::new(AtomicTomlFile::new(path)),
        }
    }

    /// Uses `storage.session_file` when set, the default location otherwise.
    pub fn from_settings(paths: &PortalPaths, storage: &StorageSettings) -> Result<Self> {
        let path = match &storage.session_file {
            Some(path) => path.clone(),
            None => paths.session_file()?,
        };
        Ok(Self::new(path))
    }

    pub fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&AtomicTomlFile<SessionFileDTO>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || f(&file))
            .await
            .map_err(|e| PortalError::internal(format!("Failed to join task: {}", e)))?
    }
}

#[async_trait]
impl SessionRepository for FileSessionRepository {
    async fn load(&self) -> Result<Option<Session>> {
        let loaded = self.blocking(|file| Ok(file.load()?)).await?;

        let Some(dto) = loaded else {
            return Ok(None);
        };

        if dto.version > SESSION_FILE_VERSION {
            tracing::warn!(
                "[FileSessionRepository] Ignoring session file with newer version {} (supported: {})",
                dto.version,
                SESSION_FILE_VERSION
            );
            return Ok(None);
        }

        Ok(dto.user.map(Session::from))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let dto = SessionFileDTO::with_session(session);
        self.blocking(move |file| Ok(file.save(&dto)?)).await?;
        tracing::debug!("[FileSessionRepository] Session persisted");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.blocking(|file| Ok(file.remove()?)).await?;
        tracing::debug!("[FileSessionRepository] Session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_core::session::{BankDetails, ReportingLine, SessionToken, UserProfile};
    use tempfile::TempDir;

    fn session() -> Session {
        Session::new(
            "a@x.com",
            SessionToken::new("tok-123"),
            UserProfile {
                email: "a@x.com".to_string(),
                name: "Asha Rao".to_string(),
                role: "Consultant".to_string(),
                avatar: "https://example.com/a.png".to_string(),
                phone: Some("+91 98450 00000".to_string()),
                consultant_id: Some("C-42".to_string()),
                gender: None,
                dob: Some("1990-04-01".to_string()),
                contract_start: None,
                contract_end: None,
                consultant_fee: Some("1200.00".to_string()),
                reporting_to: ReportingLine {
                    name: Some("Meera".to_string()),
                    role: Some("Manager".to_string()),
                },
                bank_details: BankDetails {
                    account_number: Some("000123".to_string()),
                    ifsc_code: Some("HDFC0001".to_string()),
                    micr_code: None,
                    branch_address: Some("MG Road".to_string()),
                },
            },
        )
    }

    #[tokio::test]
    async fn test_load_without_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path().join("session.toml"));
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_restores_session() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path().join("session.toml"));
        let original = session();

        repo.save(&original).await.unwrap();

        // A fresh repository simulates a process restart.
        let reopened = FileSessionRepository::new(temp_dir.path().join("session.toml"));
        let restored = reopened.load().await.unwrap().unwrap();
        assert_eq!(restored.identifier, "a@x.com");
        assert_eq!(restored.token, SessionToken::new("tok-123"));
        assert_eq!(restored.user, original.user);
    }

    #[tokio::test]
    async fn test_session_is_stored_under_user_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.toml");
        let repo = FileSessionRepository::new(path.clone());
        repo.save(&session()).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: toml::Value = toml::from_str(&raw).unwrap();
        assert_eq!(value["user"]["identifier"].as_str(), Some("a@x.com"));
        assert_eq!(value["version"].as_integer(), Some(1));
    }

    #[test]
    fn test_from_settings_prefers_explicit_file() {
        let paths = PortalPaths::new(Some(PathBuf::from("/tmp/portal-base")));
        let default = FileSessionRepository::from_settings(&paths, &StorageSettings::default()).unwrap();
        assert_eq!(default.path(), PathBuf::from("/tmp/portal-base/session.toml"));

        let storage = StorageSettings {
            session_file: Some(PathBuf::from("/var/tmp/my-session.toml")),
        };
        let explicit = FileSessionRepository::from_settings(&paths, &storage).unwrap();
        assert_eq!(explicit.path(), PathBuf::from("/var/tmp/my-session.toml"));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path().join("session.toml"));
        repo.save(&session()).await.unwrap();

        repo.clear().await.unwrap();
        repo.clear().await.unwrap();
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_newer_file_version_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.toml");
        std::fs::write(&path, "version = 99\n").unwrap();

        let repo = FileSessionRepository::new(path);
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.toml");
        std::fs::write(&path, "version = \"one").unwrap();

        let repo = FileSessionRepository::new(path);
        assert!(repo.load().await.is_err());
    }
}
