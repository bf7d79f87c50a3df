//! Inbox watcher: operator commands over private messages.
//!
//! Commands are accepted only from current moderators of the subreddit,
//! re-checked against the live moderator list on every poll cycle.
//! Messages that were already waiting when the bot started are skipped
//! without being touched.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{BotContext, ReloadOutcome};
use crate::error::Result;
use crate::reddit::InboxMessage;
use crate::streams::{LoopStep, StopSignal, handle_poll_error};

const COMMANDS: &[&str] = &["reload_config", "dump_current_config", "exit"];

pub(super) async fn run(ctx: Arc<BotContext>, stop: StopSignal) {
    let mut watcher = InboxWatcher::new(ctx);
    let mut ticker = tokio::time::interval(watcher.ctx.settings.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("Inbox stream started");

    loop {
        ticker.tick().await;
        if stop.is_stopping() {
            break;
        }
        if let Err(e) = watcher.poll_once(&stop).await {
            if let LoopStep::Stop = handle_poll_error("inbox", e, &stop).await {
                break;
            }
        }
    }
    info!("Inbox stream stopped");
}

struct InboxWatcher {
    ctx: Arc<BotContext>,
    /// Messages already considered, whether acted on or not.
    seen: HashSet<String>,
    startup_scan_done: bool,
}

impl InboxWatcher {
    fn new(ctx: Arc<BotContext>) -> Self {
        Self {
            ctx,
            seen: HashSet::new(),
            startup_scan_done: false,
        }
    }

    async fn poll_once(&mut self, stop: &StopSignal) -> Result<()> {
        let messages = self
            .ctx
            .reddit
            .unread_messages(self.ctx.settings.batch_limit)
            .await?;

        // Anything unread before startup predates this process; leave it
        // unread for a human.
        if !self.startup_scan_done {
            self.startup_scan_done = true;
            for msg in &messages {
                debug!(message = %msg.name, "Skipping pre-startup inbox message");
                self.seen.insert(msg.name.clone());
            }
            return Ok(());
        }

        let fresh: Vec<&InboxMessage> = messages
            .iter()
            .rev()
            .filter(|m| !self.seen.contains(&m.name))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        let rules = self.ctx.rules.snapshot();
        if !rules.general_settings.enable_inbox_actions {
            debug!("Inbox actions disabled, leaving messages unread");
            return Ok(());
        }

        let moderators = self
            .ctx
            .reddit
            .moderators(&self.ctx.settings.subreddit)
            .await?;

        for msg in fresh {
            if stop.is_stopping() {
                break;
            }

            let Some(author) = msg.author.as_deref() else {
                self.seen.insert(msg.name.clone());
                continue;
            };
            if !moderators.iter().any(|m| m == author) {
                debug!(author, message = %msg.name, "Ignoring message from non-moderator");
                self.seen.insert(msg.name.clone());
                continue;
            }

            // A message only counts as seen once its command went through;
            // a transient failure leaves it eligible for the next cycle.
            match self.handle_command(msg, author, stop).await {
                Ok(()) => {
                    self.seen.insert(msg.name.clone());
                }
                Err(e) if e.is_fatal() || e.retry_after().is_some() => return Err(e),
                Err(e) => {
                    warn!(message = %msg.name, error = %e, "Failed to handle inbox command, will retry next cycle");
                }
            }
        }
        Ok(())
    }

    /// The command is the subject when recognized, otherwise the body.
    /// Every moderator message gets a reply and is marked read, including
    /// unrecognized ones.
    async fn handle_command(
        &self,
        msg: &InboxMessage,
        author: &str,
        stop: &StopSignal,
    ) -> Result<()> {
        let command = resolve_command(&msg.subject, &msg.body);
        info!(author, command, "Inbox command received");

        match command {
            "reload_config" => {
                match self.ctx.reload_rules().await? {
                    ReloadOutcome::Installed => {
                        self.reply(msg, "Configuration reloaded.").await?;
                    }
                    ReloadOutcome::Rejected { error } => {
                        self.reply(
                            msg,
                            &format!("Configuration was NOT reloaded:\n\n```\n{error}\n```"),
                        )
                        .await?;
                    }
                }
                self.ctx.reddit.mark_read(&msg.name).await?;
            }
            "dump_current_config" => {
                let yaml = self.ctx.rules.snapshot().to_yaml()?;
                self.reply(msg, &format!("Current configuration:\n\n```\n{yaml}\n```"))
                    .await?;
                self.ctx.reddit.mark_read(&msg.name).await?;
            }
            "exit" => {
                info!(author, "Exit command received, stopping streams");
                self.ctx.reddit.mark_read(&msg.name).await?;
                stop.trigger();
            }
            other => {
                debug!(command = other, "Unrecognized inbox command");
                self.reply(
                    msg,
                    &format!(
                        "Command not recognized. Available commands: {}.",
                        COMMANDS.join(", ")
                    ),
                )
                .await?;
                self.ctx.reddit.mark_read(&msg.name).await?;
            }
        }
        Ok(())
    }

    async fn reply(&self, msg: &InboxMessage, body: &str) -> Result<()> {
        self.ctx.reddit.reply(&msg.name, body).await?;
        Ok(())
    }
}

/// The subject wins when it names a command; otherwise the body is taken
/// verbatim (recognized or not).
fn resolve_command<'a>(subject: &'a str, body: &'a str) -> &'a str {
    let subject = subject.trim();
    if COMMANDS.contains(&subject) {
        subject
    } else {
        body.trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_takes_precedence_when_recognized() {
        assert_eq!(resolve_command("reload_config", "whatever"), "reload_config");
        assert_eq!(resolve_command(" exit ", ""), "exit");
    }

    #[test]
    fn unrecognized_subject_falls_back_to_body() {
        assert_eq!(resolve_command("hi there", " dump_current_config "), "dump_current_config");
        assert_eq!(resolve_command("hi there", "nonsense"), "nonsense");
    }
}
