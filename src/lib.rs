//! Modwatch — moderation automation for a single subreddit.

pub mod actions;
pub mod config;
pub mod error;
pub mod history;
pub mod reddit;
pub mod ruleset;
pub mod settings;
pub mod streams;
pub mod sync;
