use anyhow::Result;
use colored::Colorize;

use super::AppContext;

pub async fn login(ctx: &AppContext, identifier: &str) -> Result<()> {
    ctx.restore().await?;
    let session = ctx.portal.login(identifier).await?;
    println!(
        "{} {} ({})",
        "Logged in as".green(),
        session.user.name.bold(),
        session.user.email
    );

    ctx.portal.notifications().refresh().await?;
    let unread = ctx.portal.notifications().unread_count();
    if unread > 0 {
        println!("You have {} unread notification(s).", unread.to_string().bold());
    }
    if let Some(action) = ctx.portal.notifications().action_required_notification() {
        println!(
            "{} {} (#{})",
            "Action required:".bright_yellow(),
            action.title,
            action.id
        );
    }
    Ok(())
}

pub async fn logout(ctx: &AppContext) -> Result<()> {
    ctx.restore().await?;
    ctx.portal.logout().await;
    println!("{}", "Logged out".green());
    Ok(())
}

pub async fn whoami(ctx: &AppContext) -> Result<()> {
    ctx.require_session().await?;
    let Some(user) = ctx.portal.session().current_user() else {
        anyhow::bail!("Not logged in");
    };

    println!("{} <{}>", user.name.bold(), user.email);
    println!("  Role:       {}", user.role);
    if let Some(id) = &user.consultant_id {
        println!("  Consultant: {id}");
    }
    if let Some(phone) = &user.phone {
        println!("  Phone:      {phone}");
    }
    if let Some(manager) = &user.reporting_to.name {
        println!("  Reports to: {manager}");
    }
    let bank = &user.bank_details;
    if let Some(account) = &bank.account_number {
        println!(
            "  Bank:       {} (IFSC {})",
            account,
            bank.ifsc_code.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
