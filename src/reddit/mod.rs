//! Reddit capability surface.
//!
//! The stream watchers and the action executor talk to the platform only
//! through the [`RedditApi`] trait, so tests can substitute a recording
//! mock. The reqwest-backed implementation lives in [`client`].

pub mod client;

pub use client::RedditClient;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RedditError;

/// A wiki page's markdown content and last editor.
#[derive(Debug, Clone)]
pub struct WikiPage {
    pub content: String,
    pub revised_by: Option<String>,
}

/// One entry from the subreddit moderation log.
#[derive(Debug, Clone, Deserialize)]
pub struct ModLogEntry {
    /// Platform id of the log entry itself (the stream cursor).
    pub id: String,
    /// Action kind, e.g. `editflair` or `wikirevise`.
    pub action: String,
    #[serde(default)]
    pub details: Option<String>,
    /// Acting moderator's name (`reddit` for admin actions).
    #[serde(rename = "mod")]
    pub moderator: String,
    #[serde(default)]
    pub target_fullname: Option<String>,
    #[serde(default)]
    pub target_permalink: Option<String>,
}

/// A submission, as seen by the watchers and the executor.
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub id: String,
    /// Fullname, e.g. `t3_abc123`.
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    pub permalink: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub link_flair_text: Option<String>,
}

/// A freshly created comment.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentRef {
    /// Fullname, e.g. `t1_def456`.
    pub name: String,
    #[serde(default)]
    pub permalink: String,
}

/// A private message from the inbox.
#[derive(Debug, Clone, Deserialize)]
pub struct InboxMessage {
    /// Fullname, e.g. `t4_ghi789`.
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// A post flair template as currently defined on the subreddit.
#[derive(Debug, Clone, Deserialize)]
pub struct FlairTemplate {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub css_class: String,
    #[serde(default)]
    pub background_color: String,
    #[serde(default)]
    pub text_color: String,
    #[serde(default)]
    pub mod_only: bool,
}

/// A removal reason as currently defined on the subreddit.
#[derive(Debug, Clone, Deserialize)]
pub struct RemovalReasonEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
}

/// Everything the bot does against the platform. Implementations must be
/// safe to share across the three stream loops.
#[async_trait]
pub trait RedditApi: Send + Sync {
    // ── Reads ───────────────────────────────────────────────────────

    /// Fetch a subreddit wiki page.
    async fn wiki_page(&self, subreddit: &str, page: &str) -> Result<WikiPage, RedditError>;

    /// Mod-log entries newer than `before` (a previous entry id), newest
    /// first. `None` returns the latest `limit` entries.
    async fn modlog(
        &self,
        subreddit: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ModLogEntry>, RedditError>;

    /// Submissions newer than `before` (a post fullname), newest first.
    async fn new_posts(
        &self,
        subreddit: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Post>, RedditError>;

    /// Unread private messages, newest first.
    async fn unread_messages(&self, limit: u32) -> Result<Vec<InboxMessage>, RedditError>;

    /// Fetch a submission by id (without the `t3_` prefix).
    async fn submission(&self, id: &str) -> Result<Post, RedditError>;

    /// Author and permalink of an arbitrary item (submission or comment).
    async fn item_info(
        &self,
        fullname: &str,
    ) -> Result<(Option<String>, String), RedditError>;

    /// Names of the subreddit's moderators.
    async fn moderators(&self, subreddit: &str) -> Result<Vec<String>, RedditError>;

    // ── Side effects ────────────────────────────────────────────────

    /// Reply to an item, returning the created comment.
    async fn reply(&self, parent_fullname: &str, body: &str) -> Result<CommentRef, RedditError>;

    /// Distinguish a comment as an official mod comment, optionally sticky.
    async fn distinguish(&self, comment_fullname: &str, sticky: bool) -> Result<(), RedditError>;

    /// Approve an item (used so the bot's own comments aren't spam-filtered).
    async fn approve(&self, fullname: &str) -> Result<(), RedditError>;

    /// Lock an item against further replies.
    async fn lock(&self, fullname: &str) -> Result<(), RedditError>;

    /// Remove an item, optionally tagged with a removal-reason id.
    async fn remove(&self, fullname: &str, reason_id: Option<&str>) -> Result<(), RedditError>;

    /// Send a removal notice for an item to its author.
    async fn send_removal_message(
        &self,
        fullname: &str,
        title: &str,
        message: &str,
    ) -> Result<(), RedditError>;

    /// Ban a user from the subreddit.
    async fn ban_user(
        &self,
        subreddit: &str,
        user: &str,
        reason: &str,
        message: &str,
    ) -> Result<(), RedditError>;

    /// Send a private message. `recipient` may be a user name or
    /// `/r/<subreddit>` for modmail.
    async fn send_private_message(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), RedditError>;

    /// Mark an inbox message read.
    async fn mark_read(&self, message_fullname: &str) -> Result<(), RedditError>;

    // ── Catalog sync ────────────────────────────────────────────────

    async fn flair_templates(&self, subreddit: &str) -> Result<Vec<FlairTemplate>, RedditError>;

    async fn create_flair_template(
        &self,
        subreddit: &str,
        text: &str,
        settings: &crate::ruleset::PostFlairTemplate,
    ) -> Result<(), RedditError>;

    async fn update_flair_template(
        &self,
        subreddit: &str,
        template_id: &str,
        text: &str,
        settings: &crate::ruleset::PostFlairTemplate,
    ) -> Result<(), RedditError>;

    async fn removal_reasons(
        &self,
        subreddit: &str,
    ) -> Result<Vec<RemovalReasonEntry>, RedditError>;

    async fn create_removal_reason(
        &self,
        subreddit: &str,
        title: &str,
        message: &str,
    ) -> Result<(), RedditError>;

    async fn update_removal_reason(
        &self,
        subreddit: &str,
        reason_id: &str,
        title: &str,
        message: &str,
    ) -> Result<(), RedditError>;
}

/// Item-kind prefix of a fullname (`t1` comment, `t3` submission, ...).
pub fn fullname_kind(fullname: &str) -> Option<&str> {
    fullname.split_once('_').map(|(kind, _)| kind)
}

/// Strip the kind prefix from a fullname.
pub fn fullname_id(fullname: &str) -> Option<&str> {
    fullname.split_once('_').map(|(_, id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullname_helpers() {
        assert_eq!(fullname_kind("t3_abc123"), Some("t3"));
        assert_eq!(fullname_id("t3_abc123"), Some("abc123"));
        assert_eq!(fullname_kind("garbage"), None);
    }
}
