//! Process settings sourced from the `MODWATCH_*` environment namespace.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Everything the bot needs from the environment: platform credentials,
/// the target subreddit, persistence location, and polling knobs.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Reddit OAuth app client id.
    pub client_id: String,
    /// Reddit OAuth app client secret.
    pub client_secret: SecretString,
    /// Bot account username.
    pub username: String,
    /// Bot account password (script-app password grant).
    pub password: SecretString,
    /// User agent sent on every request.
    pub user_agent: String,
    /// Subreddit the bot moderates.
    pub subreddit: String,
    /// Wiki page holding the rule document.
    pub rules_wiki_page: String,
    /// History database path. `None` means an ephemeral in-memory store,
    /// which resets the dedup window on restart.
    pub db_path: Option<String>,
    /// Delay between poll cycles on each stream.
    pub poll_interval: Duration,
    /// How long a loop suspends after the platform rate-limits it.
    pub ratelimit_cooldown: Duration,
    /// Maximum events requested per poll batch.
    pub batch_limit: u32,
}

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

impl Settings {
    /// Read settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = required("MODWATCH_USERNAME")?;
        let user_agent = std::env::var("MODWATCH_USER_AGENT").unwrap_or_else(|_| {
            format!(
                "modwatch/{} (by /u/{})",
                env!("CARGO_PKG_VERSION"),
                username
            )
        });

        let batch_limit = match std::env::var("MODWATCH_BATCH_LIMIT") {
            Ok(v) => v.parse::<u32>().map_err(|e| ConfigError::InvalidValue {
                key: "MODWATCH_BATCH_LIMIT".to_string(),
                message: e.to_string(),
            })?,
            Err(_) => 25,
        };

        Ok(Self {
            client_id: required("MODWATCH_CLIENT_ID")?,
            client_secret: SecretString::from(required("MODWATCH_CLIENT_SECRET")?),
            password: SecretString::from(required("MODWATCH_PASSWORD")?),
            username,
            user_agent,
            subreddit: required("MODWATCH_SUBREDDIT")?,
            rules_wiki_page: std::env::var("MODWATCH_RULES_WIKI_PAGE")
                .unwrap_or_else(|_| "botconfig/modwatch".to_string()),
            db_path: std::env::var("MODWATCH_DB_PATH").ok(),
            poll_interval: parse_secs("MODWATCH_POLL_INTERVAL_SECS", 30)?,
            ratelimit_cooldown: parse_secs("MODWATCH_RATELIMIT_COOLDOWN_SECS", 900)?,
            batch_limit,
        })
    }
}
