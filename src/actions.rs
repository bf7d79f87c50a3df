//! Action dispatch: performs a matched rule's side effects against the
//! platform, gated by the history ledger.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::BotContext;
use crate::error::{ActionError, ConfigError, Error, RedditError, Result};
use crate::reddit::Post;
use crate::ruleset::{FlairAction, Ruleset};

/// Platform limit on comment length, in characters.
pub const COMMENT_MAX_LEN: usize = 10_000;

/// Posterity comments truncate the copied body here, leaving room for the
/// fixed header, trailer, and bot boilerplate under [`COMMENT_MAX_LEN`].
const POSTERITY_BODY_LIMIT: usize = 9_500;

const POSTERITY_HEADER: &str = "This is a copy of the original post body for posterity:\n\n --- \n";
const POSTERITY_TRAILER: &str = " \n\n --- \n Please downvote this comment until it collapses.\n\n";

/// Append the standard "I am a bot" disclaimer to a comment body.
pub fn format_comment(body: &str, subreddit: &str) -> String {
    format!(
        "{body}\n\n --- \nI am a bot, and this action was performed automatically.  \
         If you have any questions, please [contact the mods of this subreddit]\
         (https://www.reddit.com/message/compose?to=/r/{subreddit})."
    )
}

/// Build the posterity-comment body for a post's self text. Truncation is
/// deterministic and never cuts into the trailer.
pub fn posterity_comment(selftext: &str) -> String {
    let mut body: String = selftext.chars().take(POSTERITY_BODY_LIMIT).collect();
    if selftext.chars().count() > POSTERITY_BODY_LIMIT {
        body.push_str("...");
    }
    format!("{POSTERITY_HEADER}{body}{POSTERITY_TRAILER}")
}

/// Executes flair actions against the platform. Every side effect is
/// preceded by a history check and followed by a history write, keyed by
/// (item permalink, action name); a positive check is a silent no-op.
pub struct ActionExecutor {
    ctx: Arc<BotContext>,
}

impl ActionExecutor {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    fn subreddit(&self) -> &str {
        &self.ctx.settings.subreddit
    }

    /// Run the ordered action list for a matched flair against a post.
    /// The history write for each action commits before the next action
    /// starts, so a re-delivered event cannot double-execute.
    pub async fn run_flair_actions(
        &self,
        rules: &Ruleset,
        flair: &str,
        post: &Post,
    ) -> Result<()> {
        for action in rules.actions_for(flair) {
            let name = action.name();
            if self.ctx.history.check(&post.permalink, name).await? {
                debug!(
                    permalink = %post.permalink,
                    action = name,
                    "Action already performed, skipping"
                );
                continue;
            }
            self.apply(rules, flair, action, post).await?;
            self.ctx.history.add(&post.permalink, name).await?;
        }
        Ok(())
    }

    async fn apply(
        &self,
        rules: &Ruleset,
        flair: &str,
        action: &FlairAction,
        post: &Post,
    ) -> Result<()> {
        match action {
            FlairAction::Comment { body } => self.do_comment(post, body).await,
            FlairAction::Remove => self.do_remove(post).await,
            FlairAction::RemoveWithReason { reason } => {
                self.do_remove_with_reason(rules, flair, post, reason).await
            }
            FlairAction::Ban => self.do_ban(flair, post).await,
        }
    }

    /// Reply with a distinguished sticky comment. A failure of the
    /// distinguish/approve follow-ups is logged only: the comment itself
    /// already landed.
    async fn do_comment(&self, post: &Post, body: &str) -> Result<()> {
        info!(
            author = post.author.as_deref().unwrap_or("[deleted]"),
            permalink = %post.permalink,
            "Commenting on post"
        );
        let comment = self
            .ctx
            .reddit
            .reply(&post.name, &format_comment(body, self.subreddit()))
            .await
            .map_err(ActionError::Reddit)?;

        if let Err(e) = self.ctx.reddit.distinguish(&comment.name, true).await {
            warn!(comment = %comment.name, error = %e, "Failed to distinguish comment");
        }
        if let Err(e) = self.ctx.reddit.approve(&comment.name).await {
            warn!(comment = %comment.name, error = %e, "Failed to approve comment");
        }
        Ok(())
    }

    async fn do_remove(&self, post: &Post) -> Result<()> {
        info!(permalink = %post.permalink, "Removing post");
        self.ctx
            .reddit
            .remove(&post.name, None)
            .await
            .map_err(ActionError::Reddit)?;
        Ok(())
    }

    /// Remove tagged with a named reason, then notify the author. The
    /// reason must exist in the active document (validated at load; a miss
    /// here is a defensive per-item failure reported to the moderators).
    /// A failed notification is reported but the removal is not retried.
    async fn do_remove_with_reason(
        &self,
        rules: &Ruleset,
        flair: &str,
        post: &Post,
        reason_title: &str,
    ) -> Result<()> {
        let message = match rules.removal_reasons.get(reason_title) {
            Some(reason) => reason.message.clone(),
            None => {
                error!(reason = %reason_title, "Removal reason missing from active rules");
                let body = format!(
                    "While trying to remove the post {}, the reason '{reason_title}' was given.\n\n\
                     However, no removal reason with the title '{reason_title}' could be found.",
                    post.permalink,
                );
                if let Err(e) = self
                    .ctx
                    .reddit
                    .send_private_message(
                        &self.ctx.modmail_recipient(),
                        "modwatch config error",
                        &body,
                    )
                    .await
                {
                    warn!(error = %e, "Failed to notify moderators of missing removal reason");
                }
                return Err(Error::Config(ConfigError::UnknownRemovalReason {
                    flair: flair.to_string(),
                    reason: reason_title.to_string(),
                }));
            }
        };

        let catalog = self
            .ctx
            .reddit
            .removal_reasons(self.subreddit())
            .await
            .map_err(ActionError::Reddit)?;
        let reason_id = catalog
            .iter()
            .find(|r| r.title == reason_title)
            .map(|r| r.id.clone());

        info!(permalink = %post.permalink, reason = %reason_title, "Removing post with reason");
        self.ctx
            .reddit
            .remove(&post.name, reason_id.as_deref())
            .await
            .map_err(ActionError::Reddit)?;

        if let Err(e) = self
            .ctx
            .reddit
            .send_removal_message(&post.name, reason_title, &message)
            .await
        {
            warn!(
                permalink = %post.permalink,
                error = %e,
                "Removal succeeded but the author notification failed"
            );
        }
        Ok(())
    }

    async fn do_ban(&self, flair: &str, post: &Post) -> Result<()> {
        let author = post.author.as_deref().ok_or_else(|| {
            Error::Action(ActionError::NoAuthor {
                fullname: post.name.clone(),
                action: "ban".to_string(),
            })
        })?;
        info!(user = author, flair, "Banning user");
        self.ctx
            .reddit
            .ban_user(self.subreddit(), author, &format!("Flair rule: {flair}"), "")
            .await
            .map_err(ActionError::Reddit)?;
        Ok(())
    }

    /// Preserve a text post's body as a locked, distinguished comment.
    /// Keyed in history as `save_post_body`; a post the platform rejects
    /// for any JSON-level reason other than a rate limit is recorded as
    /// handled, since a retry would fail identically.
    pub async fn save_post_body(&self, rules: &Ruleset, post: &Post) -> Result<()> {
        const HISTORY_ACTION: &str = "save_post_body";

        if post.selftext.trim().is_empty() {
            return Ok(());
        }
        if let Some(author) = post.author.as_deref() {
            if rules
                .posterity_comment_settings
                .ignore_users
                .iter()
                .any(|u| u.eq_ignore_ascii_case(author))
            {
                debug!(author, post = %post.name, "Author is on the ignore list, skipping");
                return Ok(());
            }
        }
        if self.ctx.history.check(&post.permalink, HISTORY_ACTION).await? {
            return Ok(());
        }

        info!(post = %post.name, "Saving post body for posterity");
        let body = format_comment(&posterity_comment(&post.selftext), self.subreddit());

        let comment = match self.ctx.reddit.reply(&post.name, &body).await {
            Ok(comment) => comment,
            Err(e @ RedditError::Api { .. }) if !e.is_json_ratelimit() => {
                warn!(post = %post.name, error = %e, "Platform rejected posterity comment, marking handled");
                self.ctx.history.add(&post.permalink, HISTORY_ACTION).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.ctx.reddit.distinguish(&comment.name, false).await {
            warn!(comment = %comment.name, error = %e, "Failed to distinguish posterity comment");
        }
        if let Err(e) = self.ctx.reddit.lock(&comment.name).await {
            warn!(comment = %comment.name, error = %e, "Failed to lock posterity comment");
        }

        self.ctx.history.add(&post.permalink, HISTORY_ACTION).await?;
        Ok(())
    }

    /// Remove an item and ban its author for ban evasion, both gated
    /// through history.
    pub async fn remove_and_ban_evader(
        &self,
        fullname: &str,
        permalink: &str,
        author: &str,
    ) -> Result<()> {
        if !self.ctx.history.check(permalink, "remove").await? {
            self.ctx
                .reddit
                .remove(fullname, None)
                .await
                .map_err(ActionError::Reddit)?;
            self.ctx.history.add(permalink, "remove").await?;
        }
        if !self.ctx.history.check(permalink, "ban").await? {
            self.ctx
                .reddit
                .ban_user(self.subreddit(), author, "Ban evasion", "Ban evasion")
                .await
                .map_err(ActionError::Reddit)?;
            self.ctx.history.add(permalink, "ban").await?;
        }
        Ok(())
    }
}
