pub mod notifications;
pub mod session;
pub mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use portal_application::Portal;
use portal_core::config::PortalSettings;
use portal_core::notification::{Notification, NotificationKind};
use portal_infrastructure::{ConfigService, FileSessionRepository, PortalPaths};
use portal_interaction::HttpPortalClient;

/// Everything a command needs, built once from the global flags.
pub struct AppContext {
    pub settings: PortalSettings,
    pub portal: Portal,
}

impl AppContext {
    pub fn load(config_dir: Option<PathBuf>) -> Result<Self> {
        let paths = PortalPaths::new(config_dir);
        let config = ConfigService::from_paths(&paths)?;
        let settings = config
            .get_config()
            .with_context(|| format!("Failed to load {}", config.path().display()))?;

        let repository = FileSessionRepository::from_settings(&paths, &settings.storage)?;
        tracing::debug!(
            config = %config.path().display(),
            session = %repository.path().display(),
            backend = %settings.backend.base_url,
            "[portal] Loaded settings"
        );

        let client = Arc::new(HttpPortalClient::from_settings(&settings.backend));
        let portal = Portal::with_backend(&settings, client, Arc::new(repository));
        Ok(Self { settings, portal })
    }

    /// Restores the persisted session and waits for its profile refresh.
    pub async fn restore(&self) -> Result<()> {
        if let Some(refresh) = self.portal.start().await {
            refresh.await.context("Profile refresh task failed")?;
        }
        Ok(())
    }

    /// Like [`restore`](Self::restore), but fails without a session.
    pub async fn require_session(&self) -> Result<()> {
        self.restore().await?;
        if !self.portal.session().is_authenticated() {
            anyhow::bail!("Not logged in. Run `portal login <identifier>` first.");
        }
        Ok(())
    }
}

pub fn print_notification(notification: &Notification) {
    let marker = if notification.is_read { " " } else { "*" };
    let kind = match notification.kind {
        NotificationKind::ActionRequired => "ACTION".bright_red().bold(),
        NotificationKind::Info => "INFO".bright_blue(),
    };
    let created = notification
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    let line = format!(
        "{marker} #{:<5} {:<6} {}  {}",
        notification.id.to_string(),
        kind,
        notification.title,
        created.bright_black()
    );
    if notification.is_read {
        println!("{}", line.dimmed());
    } else {
        println!("{line}");
    }
    println!("         {}", notification.message);
}
