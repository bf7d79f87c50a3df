//! Catalog reconciliation: push the rule document's flair templates and
//! removal reasons to the subreddit.
//!
//! Add-or-update only. Entries that exist remotely but are absent from the
//! document are left untouched, never deleted.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::RedditError;
use crate::reddit::{FlairTemplate, RedditApi};
use crate::ruleset::{PostFlairTemplate, RemovalReason};

fn template_differs(remote: &FlairTemplate, want: &PostFlairTemplate) -> bool {
    remote.css_class != want.css_class
        || remote.background_color != want.background_color
        || remote.text_color != want.text_color
        || remote.mod_only != want.mod_only
}

/// Create or update the subreddit's post flair templates to match the
/// document, in document order.
pub async fn sync_post_flair(
    reddit: &dyn RedditApi,
    subreddit: &str,
    templates: &IndexMap<String, PostFlairTemplate>,
) -> Result<(), RedditError> {
    let existing = reddit.flair_templates(subreddit).await?;

    for (text, want) in templates {
        match existing.iter().find(|t| &t.text == text) {
            Some(remote) if template_differs(remote, want) => {
                info!(flair = %text, "Updating post flair template");
                reddit
                    .update_flair_template(subreddit, &remote.id, text, want)
                    .await?;
            }
            Some(_) => {
                debug!(flair = %text, "Post flair template already matches, skipping");
            }
            None => {
                info!(flair = %text, "Adding post flair template");
                reddit.create_flair_template(subreddit, text, want).await?;
            }
        }
    }
    Ok(())
}

/// Create or update the subreddit's removal reasons to match the document,
/// in document order.
pub async fn sync_removal_reasons(
    reddit: &dyn RedditApi,
    subreddit: &str,
    reasons: &IndexMap<String, RemovalReason>,
) -> Result<(), RedditError> {
    let existing = reddit.removal_reasons(subreddit).await?;

    for (title, want) in reasons {
        match existing.iter().find(|r| &r.title == title) {
            Some(remote) if remote.message != want.message => {
                info!(reason = %title, "Updating removal reason");
                reddit
                    .update_removal_reason(subreddit, &remote.id, title, &want.message)
                    .await?;
            }
            Some(_) => {
                debug!(reason = %title, "Removal reason already matches, skipping");
            }
            None => {
                info!(reason = %title, "Adding removal reason");
                reddit
                    .create_removal_reason(subreddit, title, &want.message)
                    .await?;
            }
        }
    }
    Ok(())
}
