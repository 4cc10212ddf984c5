use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_LOG_FILTER: &str = "portal=info,portal_application=info,warn";

#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Employee portal client - session, notifications and bank detail acknowledgements", long_about = None)]
struct Cli {
    /// Directory holding config.toml and session.toml
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with an email or username
    Login { identifier: String },
    /// Clear the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List notifications once
    Notifications {
        /// Only unread entries
        #[arg(long)]
        unread: bool,
    },
    /// Mark a notification read
    MarkRead { id: u64 },
    /// Poll notifications until interrupted
    Watch,
    /// Acknowledge a bank detail change with a confirmation file
    Acknowledge {
        #[arg(long, short)]
        notification: u64,
        #[arg(long, short, value_name = "PATH")]
        evidence: PathBuf,
    },
    /// Reject a bank detail change with a reason
    Reject {
        #[arg(long, short)]
        notification: u64,
        #[arg(long, short)]
        reason: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let ctx = commands::AppContext::load(cli.config_dir)?;

    match cli.command {
        Commands::Login { identifier } => commands::session::login(&ctx, &identifier).await?,
        Commands::Logout => commands::session::logout(&ctx).await?,
        Commands::Whoami => commands::session::whoami(&ctx).await?,
        Commands::Notifications { unread } => commands::notifications::list(&ctx, unread).await?,
        Commands::MarkRead { id } => commands::notifications::mark_read(&ctx, id).await?,
        Commands::Watch => commands::notifications::watch(&ctx).await?,
        Commands::Acknowledge {
            notification,
            evidence,
        } => commands::workflow::acknowledge(&ctx, notification, &evidence).await?,
        Commands::Reject {
            notification,
            reason,
        } => commands::workflow::reject(&ctx, notification, &reason).await?,
    }

    ctx.portal.shutdown();
    Ok(())
}
