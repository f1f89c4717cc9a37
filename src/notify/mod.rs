//! Notification channels (Bark, Slack, Discord, email) and the multiplexer
//! the runner talks to.

pub mod bark;
pub mod discord;
pub mod email;
pub mod slack;

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::config::NotifyConfig;
use crate::ingest::types::Entry;

pub use bark::BarkNotifier;
pub use discord::DiscordNotifier;
pub use email::EmailNotifier;
pub use slack::SlackNotifier;

/// Body used when an entry has neither summary nor description.
pub const EMPTY_BODY: &str = "New item published";
/// Titles listed in an aggregated message before "... and K more".
pub const AGGREGATE_LIST_MAX: usize = 5;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// One message per entry.
    async fn notify(&self, feed_name: &str, entries: &[Entry]) -> Result<()>;

    /// A single message covering all entries. No-op for an empty slice.
    async fn notify_aggregate(&self, feed_name: &str, entries: &[Entry]) -> Result<()>;

    fn name(&self) -> &'static str;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Channel-neutral rendering of an entry or a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub body: String,
    pub group: String,
    pub url: Option<String>,
}

impl Message {
    pub fn for_entry(feed_name: &str, e: &Entry) -> Self {
        let mut body = truncate(e.display_text(), 100);
        if body.is_empty() {
            body = EMPTY_BODY.to_string();
        }
        if let Some(ts) = e.published.and_then(format_published) {
            body = format!("{body}\n{ts}");
        }
        Self {
            title: format!("[{feed_name}] {}", truncate(&e.title, 50)),
            body,
            group: feed_name.to_string(),
            url: Some(e.link.clone()).filter(|l| !l.is_empty()),
        }
    }

    pub fn for_batch(feed_name: &str, entries: &[Entry]) -> Self {
        let mut lines: Vec<String> = entries
            .iter()
            .take(AGGREGATE_LIST_MAX)
            .map(|e| truncate(&e.title, 60))
            .collect();
        if entries.len() > AGGREGATE_LIST_MAX {
            lines.push(format!("... and {} more", entries.len() - AGGREGATE_LIST_MAX));
        }
        Self {
            title: format!("[{feed_name}] {} new items", entries.len()),
            body: lines.join("\n"),
            group: feed_name.to_string(),
            url: None,
        }
    }

    /// Title and body as one block, for text channels.
    pub fn as_text(&self) -> String {
        match &self.url {
            Some(u) => format!("{}\n{}\n{}", self.title, self.body, u),
            None => format!("{}\n{}", self.title, self.body),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS`, UTC.
pub fn format_published(t: time::OffsetDateTime) -> Option<String> {
    let fmt = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    t.to_offset(time::UtcOffset::UTC).format(fmt).ok()
}

/// Trim, then keep at most `max_chars` characters, appending `...` when cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}...", &s[..cut]),
    }
}

/// Trim, then keep at most `max_bytes` bytes without splitting a character,
/// appending `...` when cut.
pub fn truncate_bytes(s: &str, max_bytes: usize) -> String {
    let s = s.trim();
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut cut = max_bytes;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

/// Fans every call out to all configured channels.
pub struct NotifierMux {
    channels: Vec<DynNotifier>,
}

impl NotifierMux {
    pub fn new(channels: Vec<DynNotifier>) -> Self {
        Self { channels }
    }

    pub fn from_config(cfg: &NotifyConfig) -> Result<Self> {
        let mut channels: Vec<DynNotifier> = Vec::new();
        if let Some(b) = &cfg.bark {
            channels.push(Arc::new(BarkNotifier::new(b)?));
        }
        if let Some(url) = &cfg.slack_webhook {
            channels.push(Arc::new(SlackNotifier::new(url.clone())?));
        }
        if let Some(url) = &cfg.discord_webhook {
            channels.push(Arc::new(DiscordNotifier::new(url.clone())?));
        }
        if let Some(e) = &cfg.email {
            channels.push(Arc::new(EmailNotifier::new(e)?));
        }
        Ok(Self { channels })
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    async fn fan_out(&self, feed_name: &str, entries: &[Entry], aggregate: bool) -> Result<()> {
        if self.channels.is_empty() {
            bail!("no notification channel configured");
        }
        let mut failed = Vec::new();
        for ch in &self.channels {
            let res = if aggregate {
                ch.notify_aggregate(feed_name, entries).await
            } else {
                ch.notify(feed_name, entries).await
            };
            if let Err(e) = res {
                tracing::warn!(channel = ch.name(), feed = %feed_name, error = ?e, "notification failed");
                failed.push(ch.name());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("notification failed on: {}", failed.join(", ")))
        }
    }
}

#[async_trait]
impl Notifier for NotifierMux {
    async fn notify(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
        self.fan_out(feed_name, entries, false).await
    }

    async fn notify_aggregate(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.fan_out(feed_name, entries, true).await
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn entry(title: &str, description: &str) -> Entry {
        Entry {
            guid: title.into(),
            link: format!("https://example.com/{title}"),
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("Hello World", 20), "Hello World");
        assert_eq!(
            truncate("This is a very long sentence that needs to be truncated", 10),
            "This is a ..."
        );
        assert_eq!(truncate("你好世界", 10), "你好世界");
        assert_eq!(
            truncate("这是一个很长的中文句子需要被截断处理", 10),
            "这是一个很长的中文句..."
        );
        assert_eq!(truncate("Hello 世界 this is a test 测试", 15), "Hello 世界 this i...");
        assert_eq!(truncate("Hello 👋 World 🌍", 10), "Hello 👋 Wo...");
        assert_eq!(truncate("", 10), "");
        assert_eq!(truncate("   trimmed   ", 20), "trimmed");
    }

    #[test]
    fn truncate_bytes_never_splits_chars() {
        let out = truncate_bytes("你好世界测试", 10);
        assert_eq!(out, "你好世...");
        assert!(out.len() <= 10 + 3);

        assert_eq!(truncate_bytes("Hello世界", 8), "Hello世...");
        assert_eq!(truncate_bytes("short", 8), "short");
    }

    #[test]
    fn entry_message_shape() {
        let e = entry("A title", "");
        let m = Message::for_entry("Blog", &e);
        assert_eq!(m.title, "[Blog] A title");
        assert_eq!(m.body, EMPTY_BODY);
        assert_eq!(m.group, "Blog");
        assert_eq!(m.url.as_deref(), Some("https://example.com/A title"));

        let mut e = entry("T", "the description");
        e.summary = Some("the summary".into());
        assert_eq!(Message::for_entry("Blog", &e).body, "the summary");
    }

    #[test]
    fn entry_message_includes_publication_time() {
        let mut e = entry("T", "d");
        e.published = Some(time::macros::datetime!(2025-06-10 04:00:00 UTC));
        assert_eq!(Message::for_entry("f", &e).body, "d\n2025-06-10 04:00:00");
    }

    #[test]
    fn batch_message_lists_five_then_more() {
        let entries: Vec<Entry> = (1..=7).map(|i| entry(&format!("t{i}"), "")).collect();
        let m = Message::for_batch("News", &entries);
        assert_eq!(m.title, "[News] 7 new items");
        assert_eq!(m.body, "t1\nt2\nt3\nt4\nt5\n... and 2 more");
        assert!(m.url.is_none());

        let m = Message::for_batch("News", &entries[..2]);
        assert_eq!(m.body, "t1\nt2");
    }

    struct Recording {
        name: &'static str,
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
            self.calls.lock().push(format!("{feed_name}:{}", entries.len()));
            if self.fail {
                bail!("boom");
            }
            Ok(())
        }

        async fn notify_aggregate(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
            self.notify(feed_name, entries).await
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn rec(name: &'static str, fail: bool) -> Arc<Recording> {
        Arc::new(Recording {
            name,
            fail,
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn mux_attempts_every_channel_and_reports_failures() {
        let a = rec("a", true);
        let b = rec("b", false);
        let mux = NotifierMux::new(vec![a.clone() as DynNotifier, b.clone()]);

        let err = mux.notify("f", &[entry("x", "")]).await.unwrap_err();
        assert!(err.to_string().contains("a"));
        assert_eq!(a.calls.lock().len(), 1);
        assert_eq!(b.calls.lock().len(), 1, "second channel still attempted");
    }

    #[tokio::test]
    async fn mux_without_channels_fails() {
        let mux = NotifierMux::from_config(&NotifyConfig::default()).unwrap();
        assert!(mux.is_empty());
        assert!(mux.notify("f", &[entry("x", "")]).await.is_err());
        assert!(mux.notify_aggregate("f", &[]).await.is_ok());
    }
}
