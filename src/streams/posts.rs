//! New-post watcher: preserves a copy of each text post's body as a
//! locked, distinguished comment, so later edits or deletions don't erase
//! what the subreddit originally responded to.

use std::sync::Arc;

use tracing::{info, warn};

use crate::actions::ActionExecutor;
use crate::config::BotContext;
use crate::error::{Error, Result};
use crate::streams::{LoopStep, StopSignal, handle_poll_error};

pub(super) async fn run(ctx: Arc<BotContext>, stop: StopSignal) {
    let mut watcher = PostWatcher::new(ctx);
    let mut ticker = tokio::time::interval(watcher.ctx.settings.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("Post stream started");

    loop {
        ticker.tick().await;
        if stop.is_stopping() {
            break;
        }
        if let Err(e) = watcher.poll_once(&stop).await {
            if let LoopStep::Stop = handle_poll_error("posts", e, &stop).await {
                break;
            }
        }
    }
    info!("Post stream stopped");
}

struct PostWatcher {
    ctx: Arc<BotContext>,
    executor: ActionExecutor,
    /// Fullname of the newest post already considered.
    cursor: Option<String>,
}

impl PostWatcher {
    fn new(ctx: Arc<BotContext>) -> Self {
        let executor = ActionExecutor::new(ctx.clone());
        Self {
            ctx,
            executor,
            cursor: None,
        }
    }

    /// Fetch posts newer than the cursor and process them oldest first.
    /// The first pass (no cursor) covers the posts already on the listing,
    /// so a restart picks up anything it missed; the history ledger keeps
    /// that from double-commenting.
    async fn poll_once(&mut self, stop: &StopSignal) -> Result<()> {
        let settings = &self.ctx.settings;
        let posts = self
            .ctx
            .reddit
            .new_posts(
                &settings.subreddit,
                self.cursor.as_deref(),
                settings.batch_limit,
            )
            .await?;

        for post in posts.iter().rev() {
            if stop.is_stopping() {
                break;
            }
            let rules = self.ctx.rules.snapshot();
            if rules.general_settings.enable_create_posterity_comments {
                match self.executor.save_post_body(&rules, post).await {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() || e.retry_after().is_some() => return Err(e),
                    Err(Error::Reddit(ref re)) if re.is_json_ratelimit() => {
                        // Commenting tripped the submission rate limit.
                        // Leave the cursor and the ledger untouched and
                        // retry the same post after the cooldown.
                        warn!(
                            post = %post.name,
                            wait_secs = settings.ratelimit_cooldown.as_secs(),
                            "Comment rate limited, suspending post stream"
                        );
                        tokio::time::sleep(settings.ratelimit_cooldown).await;
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(post = %post.name, error = %e, "Failed to save post body, skipping");
                    }
                }
            }
            self.cursor = Some(post.name.clone());
        }
        Ok(())
    }
}
