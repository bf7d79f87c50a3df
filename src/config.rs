//! Shared bot context and the rule-set reload protocol.
//!
//! The active [`Ruleset`] is an immutable snapshot behind [`ConfigStore`]:
//! readers clone out an `Arc` and a reload installs a whole new one, so a
//! loop mid-cycle sees either fully the old or fully the new document.
//! A parse failure leaves the previous snapshot active and notifies the
//! moderators instead.

use std::sync::{Arc, RwLock};

use tracing::{error, info};

use crate::error::Result;
use crate::history::History;
use crate::reddit::RedditApi;
use crate::ruleset::Ruleset;
use crate::settings::Settings;
use crate::sync;

/// Atomically-swappable rule-set snapshot holder.
pub struct ConfigStore {
    current: RwLock<Arc<Ruleset>>,
}

impl ConfigStore {
    pub fn new(initial: Ruleset) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The active snapshot. Cheap; safe to hold across await points.
    pub fn snapshot(&self) -> Arc<Ruleset> {
        self.current.read().expect("rules lock poisoned").clone()
    }

    /// Replace the active snapshot wholesale.
    pub fn install(&self, rules: Ruleset) {
        *self.current.write().expect("rules lock poisoned") = Arc::new(rules);
    }
}

/// What a reload attempt did.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// A new snapshot was installed and catalogs were synced.
    Installed,
    /// The document failed validation; the prior snapshot stays active.
    Rejected { error: String },
}

/// Dependencies shared by the stream watchers: the platform client, the
/// active rule set, process settings, and the history ledger.
pub struct BotContext {
    pub settings: Settings,
    pub reddit: Arc<dyn RedditApi>,
    pub rules: ConfigStore,
    pub history: History,
}

impl BotContext {
    pub fn new(settings: Settings, reddit: Arc<dyn RedditApi>, history: History) -> Self {
        Self {
            settings,
            reddit,
            rules: ConfigStore::new(Ruleset::inert()),
            history,
        }
    }

    /// Modmail address for operator-facing notifications.
    pub fn modmail_recipient(&self) -> String {
        format!("/r/{}", self.settings.subreddit)
    }

    /// Fetch the rule document from the wiki, validate it, and either
    /// install it (then reconcile the flair/reason catalogs) or report the
    /// validation error to the moderators and keep the prior snapshot.
    pub async fn reload_rules(&self) -> Result<ReloadOutcome> {
        let subreddit = &self.settings.subreddit;
        let page_name = &self.settings.rules_wiki_page;
        info!(page = %page_name, "Updating rules from wiki");

        let page = self.reddit.wiki_page(subreddit, page_name).await?;

        let rules = match Ruleset::parse(&page.content) {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "Rule document failed validation, keeping prior rules");
                let body = format!(
                    "While trying to reload the config wiki page '{page_name}' an error occurred:\n\n\
                     ```\n{e}\n```\n\n\
                     The page was last modified by: {}",
                    page.revised_by.as_deref().unwrap_or("(unknown)"),
                );
                self.reddit
                    .send_private_message(
                        &self.modmail_recipient(),
                        "modwatch config error",
                        &body,
                    )
                    .await?;
                return Ok(ReloadOutcome::Rejected {
                    error: e.to_string(),
                });
            }
        };

        let post_flair = rules.post_flair.clone();
        let removal_reasons = rules.removal_reasons.clone();
        self.rules.install(rules);
        info!("New rule set installed");

        if !post_flair.is_empty() {
            info!("Syncing post flair templates");
            sync::sync_post_flair(self.reddit.as_ref(), subreddit, &post_flair).await?;
        }
        if !removal_reasons.is_empty() {
            info!("Syncing removal reasons");
            sync::sync_removal_reasons(self.reddit.as_ref(), subreddit, &removal_reasons).await?;
        }

        Ok(ReloadOutcome::Installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::FlairAction;

    #[test]
    fn snapshot_is_stable_across_install() {
        let store = ConfigStore::new(Ruleset::inert());
        let before = store.snapshot();

        let doc = "flair_actions:\n  SPAM:\n    - action: remove\n";
        store.install(Ruleset::parse(doc).unwrap());

        // The old snapshot is unchanged; a fresh read sees the new rules.
        assert!(before.actions_for("SPAM").is_empty());
        assert_eq!(store.snapshot().actions_for("SPAM"), &[FlairAction::Remove]);
    }
}
