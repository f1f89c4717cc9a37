// src/config/mod.rs
//! Startup configuration: the feeds file plus adapter settings read once from
//! the process environment (after `.env` has been loaded).

pub mod ai;
pub mod feeds;
pub mod notify;

pub use ai::SummarizerConfig;
pub use feeds::{load_feeds, FeedConfig, FeedsConfig};
pub use notify::{BarkConfig, EmailConfig, NotifyConfig};

/// Environment lookup used by the `from_vars` constructors, so tests can feed
/// a map instead of mutating the real environment.
pub trait VarSource {
    fn var(&self, name: &str) -> Option<String>;

    /// Trimmed value, `None` when unset or blank.
    fn non_empty(&self, name: &str) -> Option<String> {
        self.var(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// The real process environment.
pub struct ProcessEnv;

impl VarSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl VarSource for std::collections::HashMap<&str, &str> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.to_string())
    }
}
