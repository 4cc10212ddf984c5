use anyhow::Result;
use colored::Colorize;

use portal_core::notification::NotificationId;
use portal_core::workflow::WorkflowState;

use super::{AppContext, print_notification};

pub async fn list(ctx: &AppContext, unread_only: bool) -> Result<()> {
    ctx.require_session().await?;
    let poller = ctx.portal.notifications();
    poller.refresh().await?;

    let items = if unread_only {
        poller.unread_notifications()
    } else {
        poller.notifications()
    };
    if items.is_empty() {
        println!("{}", "No notifications".bright_black());
        return Ok(());
    }
    for notification in &items {
        print_notification(notification);
    }
    println!("{} unread", poller.unread_count());
    Ok(())
}

pub async fn mark_read(ctx: &AppContext, id: u64) -> Result<()> {
    ctx.require_session().await?;
    let poller = ctx.portal.notifications();
    poller.refresh().await?;

    let id = NotificationId(id);
    if poller.feed().get(id).is_none() {
        anyhow::bail!("Notification #{id} not found");
    }
    poller.mark_read(id).await?;
    println!("{} #{id}", "Marked read".green());
    Ok(())
}

/// Prints feed changes and prompts until Ctrl-C.
pub async fn watch(ctx: &AppContext) -> Result<()> {
    ctx.require_session().await?;
    let mut feed_rx = ctx.portal.notifications().subscribe();
    let mut state_rx = ctx.portal.workflow().subscribe();

    println!(
        "Polling every {}s. Press Ctrl-C to stop.",
        ctx.settings.polling.interval().as_secs()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = feed_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let feed = feed_rx.borrow_and_update().clone();
                println!("{}", format!("-- {} unread --", feed.unread_count()).bright_black());
                for notification in feed.unread() {
                    print_notification(notification);
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if let WorkflowState::Prompted { notification } = state {
                    println!(
                        "{} {} - run `portal acknowledge -n {}` or `portal reject -n {}`",
                        "Action required:".bright_yellow().bold(),
                        notification.title,
                        notification.id,
                        notification.id
                    );
                }
            }
        }
    }

    println!("{}", "Stopped".bright_black());
    Ok(())
}
