//! Error types for modwatch.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Reddit API error: {0}")]
    Reddit(#[from] RedditError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),
}

impl Error {
    /// True when the underlying cause means the process cannot usefully
    /// continue talking to the platform (revoked credentials and the like).
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Reddit(e) => e.is_fatal(),
            Error::Action(ActionError::Reddit(e)) => e.is_fatal(),
            _ => false,
        }
    }

    /// Rate-limit cooldown requested by the platform, if this error is one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Reddit(e) => e.retry_after(),
            Error::Action(ActionError::Reddit(e)) => e.retry_after(),
            _ => None,
        }
    }
}

/// Rule-document and process-configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse rule document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown action {action:?}")]
    UnknownAction { action: String },

    #[error("Action {action:?} requires an argument")]
    MissingArgument { action: String },

    #[error("Action {action:?} does not take an argument")]
    UnexpectedArgument { action: String },

    #[error("Action comment requires a non-empty message")]
    EmptyComment,

    #[error("Flair {flair:?} references unknown removal reason {reason:?}")]
    UnknownRemovalReason { flair: String, reason: String },
}

/// History-ledger persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Failed to open history database: {0}")]
    Open(String),

    #[error("History query failed: {0}")]
    Sql(#[from] libsql::Error),
}

/// Errors from the Reddit capability surface.
///
/// Classification drives the stream loops: fatal errors shut the whole
/// process down, rate limits suspend a single loop, everything else is
/// logged and retried on the next poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum RedditError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Authentication failed or token revoked")]
    Unauthorized,

    #[error("Forbidden access to {resource}")]
    Forbidden { resource: String },

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    #[error("Unexpected API response: {details}")]
    UnexpectedResponse { details: String },

    #[error("API error {error_type}: {message}")]
    Api { error_type: String, message: String },
}

impl RedditError {
    /// Authentication and authorization failures cannot be recovered locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RedditError::Unauthorized | RedditError::Forbidden { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// True for the JSON-level RATELIMIT error returned on comment spam.
    pub fn is_json_ratelimit(&self) -> bool {
        matches!(self, RedditError::Api { error_type, .. } if error_type == "RATELIMIT")
    }
}

/// A single action's side effect failed.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Reddit API error: {0}")]
    Reddit(#[from] RedditError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Target item {fullname} has no author, cannot {action}")]
    NoAuthor { fullname: String, action: String },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
