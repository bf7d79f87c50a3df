//! Rule document schema, validation, and flair matching.
//!
//! The rule document is YAML fetched from the subreddit wiki. All structural
//! and per-action validation happens here at parse time, so dispatch never
//! has to reject a malformed action. Mapping order in the document is
//! preserved (insertion order defines the sync order to the platform);
//! a duplicated mapping key keeps the last entry.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_true() -> bool {
    true
}

/// Feature toggles for the bot's three event handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default = "default_true")]
    pub enable_flair_actions: bool,
    #[serde(default = "default_true")]
    pub enable_create_posterity_comments: bool,
    #[serde(default = "default_true")]
    pub enable_inbox_actions: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            enable_flair_actions: true,
            enable_create_posterity_comments: true,
            enable_inbox_actions: true,
        }
    }
}

/// Settings for the posterity-comment handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosterityCommentSettings {
    /// Authors whose posts never get a posterity comment.
    #[serde(default)]
    pub ignore_users: Vec<String>,
}

fn default_background() -> String {
    "#dadada".to_string()
}

fn default_text_color() -> String {
    "dark".to_string()
}

/// Visual attributes of a post flair template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFlairTemplate {
    #[serde(default)]
    pub css_class: String,
    #[serde(default = "default_background")]
    pub background_color: String,
    #[serde(default = "default_text_color")]
    pub text_color: String,
    #[serde(default = "default_true")]
    pub mod_only: bool,
}

impl Default for PostFlairTemplate {
    fn default() -> Self {
        Self {
            css_class: String::new(),
            background_color: default_background(),
            text_color: default_text_color(),
            mod_only: true,
        }
    }
}

/// A named, reusable removal explanation sent to authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReason {
    pub message: String,
}

/// Wire form of a flair action: `{action, argument?}`.
///
/// The document may give the argument as a string or a bare number.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFlairAction {
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    argument: Option<ActionArgument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ActionArgument {
    Text(String),
    Number(i64),
}

impl ActionArgument {
    fn into_string(self) -> String {
        match self {
            ActionArgument::Text(s) => s,
            ActionArgument::Number(n) => n.to_string(),
        }
    }
}

/// One action to perform when a rule fires. Closed set; each variant's
/// required fields are checked when the document is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFlairAction", into = "RawFlairAction")]
pub enum FlairAction {
    /// Reply with a distinguished, stickied comment.
    Comment { body: String },
    /// Remove the target with no reason message.
    Remove,
    /// Remove the target tagged with a named removal reason and notify
    /// the author with the reason's message.
    RemoveWithReason { reason: String },
    /// Ban the target's author.
    Ban,
}

impl FlairAction {
    /// Stable name used as the history-ledger key for dedup.
    pub fn name(&self) -> &'static str {
        match self {
            FlairAction::Comment { .. } => "comment",
            FlairAction::Remove => "remove",
            FlairAction::RemoveWithReason { .. } => "remove_with_reason",
            FlairAction::Ban => "ban",
        }
    }
}

impl TryFrom<RawFlairAction> for FlairAction {
    type Error = ConfigError;

    fn try_from(raw: RawFlairAction) -> Result<Self, ConfigError> {
        match raw.action.as_str() {
            "comment" => match raw.argument {
                Some(arg) => {
                    let body = arg.into_string();
                    if body.trim().is_empty() {
                        return Err(ConfigError::EmptyComment);
                    }
                    Ok(FlairAction::Comment { body })
                }
                None => Err(ConfigError::MissingArgument {
                    action: raw.action,
                }),
            },
            "remove" => match raw.argument {
                Some(_) => Err(ConfigError::UnexpectedArgument {
                    action: raw.action,
                }),
                None => Ok(FlairAction::Remove),
            },
            "remove_with_reason" => match raw.argument {
                Some(arg) => Ok(FlairAction::RemoveWithReason {
                    reason: arg.into_string(),
                }),
                None => Err(ConfigError::MissingArgument {
                    action: raw.action,
                }),
            },
            "ban" => match raw.argument {
                Some(_) => Err(ConfigError::UnexpectedArgument {
                    action: raw.action,
                }),
                None => Ok(FlairAction::Ban),
            },
            _ => Err(ConfigError::UnknownAction { action: raw.action }),
        }
    }
}

impl From<FlairAction> for RawFlairAction {
    fn from(action: FlairAction) -> Self {
        match action {
            FlairAction::Comment { body } => RawFlairAction {
                action: "comment".to_string(),
                argument: Some(ActionArgument::Text(body)),
            },
            FlairAction::Remove => RawFlairAction {
                action: "remove".to_string(),
                argument: None,
            },
            FlairAction::RemoveWithReason { reason } => RawFlairAction {
                action: "remove_with_reason".to_string(),
                argument: Some(ActionArgument::Text(reason)),
            },
            FlairAction::Ban => RawFlairAction {
                action: "ban".to_string(),
                argument: None,
            },
        }
    }
}

/// The validated rule set: flair rules, catalogs, and settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    #[serde(default)]
    pub general_settings: GeneralSettings,
    #[serde(default)]
    pub posterity_comment_settings: PosterityCommentSettings,
    #[serde(default)]
    pub flair_actions: IndexMap<String, Vec<FlairAction>>,
    #[serde(default)]
    pub post_flair: IndexMap<String, PostFlairTemplate>,
    #[serde(default)]
    pub removal_reasons: IndexMap<String, RemovalReason>,
}

impl Ruleset {
    /// Parse and validate a rule document.
    pub fn parse(doc: &str) -> Result<Self, ConfigError> {
        let ruleset: Ruleset = serde_yaml::from_str(doc)?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// Placeholder installed before the first successful load: every
    /// handler is disabled until a real document arrives.
    pub fn inert() -> Self {
        Self {
            general_settings: GeneralSettings {
                enable_flair_actions: false,
                enable_create_posterity_comments: false,
                enable_inbox_actions: false,
            },
            ..Self::default()
        }
    }

    /// Cross-field checks that need the whole document: every
    /// `remove_with_reason` must name a reason in the catalog.
    fn validate(&self) -> Result<(), ConfigError> {
        for (flair, actions) in &self.flair_actions {
            for action in actions {
                if let FlairAction::RemoveWithReason { reason } = action {
                    if !self.removal_reasons.contains_key(reason) {
                        return Err(ConfigError::UnknownRemovalReason {
                            flair: flair.clone(),
                            reason: reason.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// The ordered action list authored under a flair, empty for an
    /// unknown flair. Exact-string match on the canonical flair text.
    pub fn actions_for(&self, flair: &str) -> &[FlairAction] {
        self.flair_actions
            .get(flair)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Serialize back to YAML (used by `dump_current_config`).
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_DOC: &str = r##"
general_settings:
  enable_flair_actions: true
posterity_comment_settings:
  ignore_users:
    - AutoModerator
flair_actions:
  SPAM:
    - action: comment
      argument: "Go away"
    - action: remove
  "Removed: Rule #1":
    - action: remove_with_reason
      argument: "Rule #1"
post_flair:
  SPAM:
    css_class: spam
    background_color: "#ff0000"
    text_color: light
    mod_only: true
removal_reasons:
  "Rule #1":
    message: "Read the FAQ"
"##;

    #[test]
    fn parses_full_document() {
        let rules = Ruleset::parse(FULL_DOC).unwrap();
        assert!(rules.general_settings.enable_flair_actions);
        assert!(rules.general_settings.enable_inbox_actions); // absent key defaults on
        assert_eq!(
            rules.posterity_comment_settings.ignore_users,
            vec!["AutoModerator"]
        );
        assert_eq!(rules.removal_reasons["Rule #1"].message, "Read the FAQ");
    }

    #[test]
    fn match_returns_authored_order() {
        let rules = Ruleset::parse(FULL_DOC).unwrap();
        let actions = rules.actions_for("SPAM");
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            FlairAction::Comment {
                body: "Go away".to_string()
            }
        );
        assert_eq!(actions[1], FlairAction::Remove);
    }

    #[test]
    fn unknown_flair_matches_nothing() {
        let rules = Ruleset::parse(FULL_DOC).unwrap();
        assert!(rules.actions_for("No Such Flair").is_empty());
    }

    #[test]
    fn comment_requires_argument() {
        let doc = "flair_actions:\n  X:\n    - action: comment\n";
        assert!(matches!(
            Ruleset::parse(doc),
            Err(ConfigError::Yaml(_)) // surfaced through serde's try_from path
        ));
    }

    #[test]
    fn comment_rejects_empty_body() {
        let doc = "flair_actions:\n  X:\n    - action: comment\n      argument: \"  \"\n";
        assert!(Ruleset::parse(doc).is_err());
    }

    #[test]
    fn remove_rejects_argument() {
        let doc = "flair_actions:\n  X:\n    - action: remove\n      argument: why\n";
        assert!(Ruleset::parse(doc).is_err());
    }

    #[test]
    fn ban_rejects_argument() {
        let doc = "flair_actions:\n  X:\n    - action: ban\n      argument: 7\n";
        assert!(Ruleset::parse(doc).is_err());
    }

    #[test]
    fn unknown_action_rejected() {
        let doc = "flair_actions:\n  X:\n    - action: explode\n";
        assert!(Ruleset::parse(doc).is_err());
    }

    #[test]
    fn remove_with_reason_must_name_existing_reason() {
        let doc = r#"
flair_actions:
  X:
    - action: remove_with_reason
      argument: "Rule #9"
removal_reasons:
  "Rule #1":
    message: "Read the FAQ"
"#;
        match Ruleset::parse(doc) {
            Err(ConfigError::UnknownRemovalReason { flair, reason }) => {
                assert_eq!(flair, "X");
                assert_eq!(reason, "Rule #9");
            }
            other => panic!("expected UnknownRemovalReason, got {other:?}"),
        }
    }

    #[test]
    fn numeric_argument_is_coerced_to_text() {
        let doc = "flair_actions:\n  X:\n    - action: comment\n      argument: 42\n";
        let rules = Ruleset::parse(doc).unwrap();
        assert_eq!(
            rules.actions_for("X")[0],
            FlairAction::Comment {
                body: "42".to_string()
            }
        );
    }

    #[test]
    fn post_flair_fields_default() {
        let doc = "post_flair:\n  Plain: {}\n";
        let rules = Ruleset::parse(doc).unwrap();
        let flair = &rules.post_flair["Plain"];
        assert_eq!(flair.css_class, "");
        assert_eq!(flair.background_color, "#dadada");
        assert_eq!(flair.text_color, "dark");
        assert!(flair.mod_only);
    }

    #[test]
    fn duplicated_flair_key_keeps_the_last_entry() {
        let doc = "flair_actions:\n  SPAM:\n    - action: remove\n  SPAM:\n    - action: ban\n";
        let rules = Ruleset::parse(doc).unwrap();
        assert_eq!(rules.actions_for("SPAM"), &[FlairAction::Ban]);
    }

    #[test]
    fn flair_key_order_is_preserved() {
        let doc = "flair_actions:\n  B:\n    - action: remove\n  A:\n    - action: remove\n";
        let rules = Ruleset::parse(doc).unwrap();
        let keys: Vec<_> = rules.flair_actions.keys().collect();
        assert_eq!(keys, vec!["B", "A"]);
    }

    #[test]
    fn yaml_round_trip_preserves_matching() {
        let original = Ruleset::parse(FULL_DOC).unwrap();
        let dumped = original.to_yaml().unwrap();
        let reparsed = Ruleset::parse(&dumped).unwrap();
        for flair in original.flair_actions.keys() {
            assert_eq!(original.actions_for(flair), reparsed.actions_for(flair));
        }
        assert_eq!(original, reparsed);
    }

    #[test]
    fn inert_ruleset_disables_everything() {
        let rules = Ruleset::inert();
        assert!(!rules.general_settings.enable_flair_actions);
        assert!(!rules.general_settings.enable_create_posterity_comments);
        assert!(!rules.general_settings.enable_inbox_actions);
    }
}
