use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use portal_application::SuccessBanner;
use portal_core::notification::NotificationId;
use portal_core::workflow::{EvidenceFile, Handoff};

use super::AppContext;

/// Binds the workflow to `id` the way the profile screen does.
async fn enter(ctx: &AppContext, id: u64) -> Result<()> {
    ctx.require_session().await?;
    ctx.portal.notifications().refresh().await?;

    let id = NotificationId(id);
    let bound = ctx
        .portal
        .workflow()
        .begin_from_handoff(Handoff::enter(id))
        .await?;
    if !bound {
        anyhow::bail!("Notification #{id} does not require action");
    }
    Ok(())
}

async fn read_evidence(path: &Path) -> Result<EvidenceFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "evidence".to_string());
    let content_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
    Ok(EvidenceFile::new(file_name, content_type, bytes))
}

fn print_banner(banner: Option<SuccessBanner>) {
    if let Some(banner) = banner {
        println!("{}", banner.message.green().bold());
    }
}

pub async fn acknowledge(ctx: &AppContext, id: u64, evidence: &Path) -> Result<()> {
    let evidence = read_evidence(evidence).await?;
    enter(ctx, id).await?;

    let workflow = ctx.portal.workflow();
    workflow.acknowledge(evidence).await?;
    print_banner(workflow.banner());
    Ok(())
}

pub async fn reject(ctx: &AppContext, id: u64, reason: &str) -> Result<()> {
    enter(ctx, id).await?;

    let workflow = ctx.portal.workflow();
    workflow.reject(reason).await?;
    print_banner(workflow.banner());
    Ok(())
}
