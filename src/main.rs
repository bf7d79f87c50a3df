use std::sync::Arc;

use modwatch::config::{BotContext, ReloadOutcome};
use modwatch::history::History;
use modwatch::reddit::RedditClient;
use modwatch::settings::Settings;
use modwatch::streams::Supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = Settings::from_env()?;
    tracing::info!(
        subreddit = %settings.subreddit,
        user = %settings.username,
        "Modwatch v{} starting",
        env!("CARGO_PKG_VERSION"),
    );

    let reddit = Arc::new(RedditClient::new(settings.clone())?);
    let history = History::open(settings.db_path.as_deref()).await?;
    if settings.db_path.is_none() {
        tracing::warn!("MODWATCH_DB_PATH not set, action history will not survive a restart");
    }

    let ctx = Arc::new(BotContext::new(settings, reddit, history));

    // The bot starts with every handler disabled until the first rule
    // document loads. A rejected document is reported to the moderators
    // by reload_rules; the streams still run so a wiki fix or an inbox
    // reload_config can recover without a restart.
    match ctx.reload_rules().await? {
        ReloadOutcome::Installed => {}
        ReloadOutcome::Rejected { error } => {
            tracing::error!(%error, "Initial rule load failed, running with all handlers disabled");
        }
    }

    Supervisor::new(ctx).run().await;
    Ok(())
}
