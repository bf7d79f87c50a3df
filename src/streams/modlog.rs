//! Moderation-log watcher.
//!
//! Polls the subreddit mod log and reacts to three entry kinds: flair
//! edits on submissions (rule dispatch), edits of the rule wiki page
//! (configuration reload), and admin "Ban Evasion" removals (remove the
//! item and ban its author).

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::actions::ActionExecutor;
use crate::config::BotContext;
use crate::error::Result;
use crate::reddit::{ModLogEntry, fullname_id, fullname_kind};
use crate::streams::{LoopStep, StopSignal, handle_poll_error};

pub(super) async fn run(ctx: Arc<BotContext>, stop: StopSignal) {
    let mut watcher = ModLogWatcher::new(ctx);
    let mut ticker = tokio::time::interval(watcher.ctx.settings.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("Mod-log stream started");

    loop {
        ticker.tick().await;
        if stop.is_stopping() {
            break;
        }
        if let Err(e) = watcher.poll_once(&stop).await {
            if let LoopStep::Stop = handle_poll_error("modlog", e, &stop).await {
                break;
            }
        }
    }
    info!("Mod-log stream stopped");
}

struct ModLogWatcher {
    ctx: Arc<BotContext>,
    executor: ActionExecutor,
    /// Id of the newest mod-log entry already processed.
    cursor: Option<String>,
}

impl ModLogWatcher {
    fn new(ctx: Arc<BotContext>) -> Self {
        let executor = ActionExecutor::new(ctx.clone());
        Self {
            ctx,
            executor,
            cursor: None,
        }
    }

    /// Fetch entries newer than the cursor and process them oldest first.
    /// The cursor advances per entry, after that entry is handled; a rate
    /// limit or fatal error leaves it in place so the entry is retried.
    async fn poll_once(&mut self, stop: &StopSignal) -> Result<()> {
        let settings = &self.ctx.settings;
        let entries = self
            .ctx
            .reddit
            .modlog(
                &settings.subreddit,
                self.cursor.as_deref(),
                settings.batch_limit,
            )
            .await?;

        for entry in entries.iter().rev() {
            if stop.is_stopping() {
                break;
            }
            match self.handle_entry(entry).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() || e.retry_after().is_some() => return Err(e),
                Err(e) => {
                    warn!(entry = %entry.id, error = %e, "Failed to process mod-log entry, skipping");
                }
            }
            self.cursor = Some(entry.id.clone());
        }
        Ok(())
    }

    async fn handle_entry(&self, entry: &ModLogEntry) -> Result<()> {
        // Admin-side ban-evasion removals carry the marker in the details
        // field regardless of the action kind.
        if entry.moderator == "reddit" && entry.details.as_deref() == Some("Ban Evasion") {
            return self.handle_ban_evasion(entry).await;
        }

        match entry.action.as_str() {
            "wikirevise" => self.handle_wiki_revision(entry).await,
            "editflair" => self.handle_flair_edit(entry).await,
            other => {
                debug!(action = other, "Ignoring mod-log entry");
                Ok(())
            }
        }
    }

    /// Reload the rules when the rule page itself was edited. Other wiki
    /// pages are ignored.
    async fn handle_wiki_revision(&self, entry: &ModLogEntry) -> Result<()> {
        let marker = format!("Page {} edited", self.ctx.settings.rules_wiki_page);
        if entry.details.as_deref() != Some(marker.as_str()) {
            return Ok(());
        }
        info!(moderator = %entry.moderator, "Rule wiki page edited, reloading rules");
        self.ctx.reload_rules().await?;
        Ok(())
    }

    /// Dispatch the authored action list for a submission's new flair.
    async fn handle_flair_edit(&self, entry: &ModLogEntry) -> Result<()> {
        let rules = self.ctx.rules.snapshot();
        if !rules.general_settings.enable_flair_actions {
            return Ok(());
        }

        let Some(fullname) = entry.target_fullname.as_deref() else {
            return Ok(());
        };
        // Only submissions carry post flair.
        if fullname_kind(fullname) != Some("t3") {
            return Ok(());
        }
        let Some(id) = fullname_id(fullname) else {
            return Ok(());
        };

        let post = self.ctx.reddit.submission(id).await?;
        let Some(flair) = post.link_flair_text.clone() else {
            debug!(post = %post.name, "Flair was cleared, nothing to do");
            return Ok(());
        };

        if rules.actions_for(&flair).is_empty() {
            debug!(flair = %flair, "No actions authored for flair");
            return Ok(());
        }
        info!(flair = %flair, post = %post.name, moderator = %entry.moderator, "Flair matched, dispatching actions");
        self.executor.run_flair_actions(&rules, &flair, &post).await
    }

    async fn handle_ban_evasion(&self, entry: &ModLogEntry) -> Result<()> {
        let rules = self.ctx.rules.snapshot();
        if !rules.general_settings.enable_flair_actions {
            return Ok(());
        }
        let Some(fullname) = entry.target_fullname.as_deref() else {
            return Ok(());
        };

        let (author, permalink) = self.ctx.reddit.item_info(fullname).await?;
        let Some(author) = author else {
            debug!(item = fullname, "Ban-evasion target has no author, skipping");
            return Ok(());
        };

        info!(item = fullname, user = %author, "Admin flagged ban evasion, removing and banning");
        self.executor
            .remove_and_ban_evader(fullname, &permalink, &author)
            .await
    }
}
