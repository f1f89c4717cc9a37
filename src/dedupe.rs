//! # Dedupe engine
//! Decides which entries of a newest-first fetch are new relative to a
//! feed's watermark, and which watermark to keep afterwards.
//!
//! Policy:
//! - no watermark yet: only the newest entry is new (no backlog flood);
//! - watermark found: everything strictly newer than it is new;
//! - watermark not found (feed rotated past it): everything is new and the
//!   watermark resynchronizes to the newest entry.
//!
//! Keys are compared as exact strings.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ingest::types::Entry;
use crate::state::WatermarkStore;

/// Which entry field identifies an entry for a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DedupeKey {
    /// GUID, or the link when the GUID is empty.
    #[default]
    Guid,
    Link,
    Title,
}

impl DedupeKey {
    pub fn as_str(self) -> &'static str {
        match self {
            DedupeKey::Guid => "guid",
            DedupeKey::Link => "link",
            DedupeKey::Title => "title",
        }
    }

    pub fn extract<'a>(self, entry: &'a Entry) -> &'a str {
        match self {
            DedupeKey::Guid if !entry.guid.is_empty() => &entry.guid,
            DedupeKey::Guid | DedupeKey::Link => &entry.link,
            DedupeKey::Title => &entry.title,
        }
    }
}

impl From<String> for DedupeKey {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "guid" => DedupeKey::Guid,
            "link" => DedupeKey::Link,
            "title" => DedupeKey::Title,
            other => {
                tracing::warn!(dedupe_key = other, "unknown dedupe_key, using guid");
                DedupeKey::Guid
            }
        }
    }
}

impl From<DedupeKey> for String {
    fn from(k: DedupeKey) -> Self {
        k.as_str().to_string()
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// The new entries are always `entries[..fresh]`.
    pub fresh: usize,
    /// Watermark to store, `None` to leave the stored one untouched.
    pub watermark: Option<String>,
    /// Whether the prior watermark was present in the fetch.
    pub matched: bool,
}

/// Classify newest-first `entries` against the `prior` watermark. Total:
/// never fails, and an empty fetch changes nothing.
pub fn classify(entries: &[Entry], prior: Option<&str>, key: DedupeKey) -> Verdict {
    let Some(newest) = entries.first() else {
        return Verdict {
            fresh: 0,
            watermark: None,
            matched: false,
        };
    };

    let Some(prior) = prior else {
        return Verdict {
            fresh: 1,
            watermark: Some(key.extract(newest).to_string()),
            matched: false,
        };
    };

    let hit = entries.iter().position(|e| key.extract(e) == prior);
    let fresh = hit.unwrap_or(entries.len());
    let matched = hit.is_some();

    // Both "something new" and "rotated past the watermark" resync to the
    // newest entry; a match on the newest entry leaves the watermark alone.
    let watermark = (fresh > 0 || !matched).then(|| key.extract(newest).to_string());

    Verdict {
        fresh,
        watermark,
        matched,
    }
}

/// Applies [`classify`] against the shared [`WatermarkStore`].
#[derive(Debug, Clone)]
pub struct Deduper {
    store: Arc<WatermarkStore>,
}

impl Deduper {
    pub fn new(store: Arc<WatermarkStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<WatermarkStore> {
        &self.store
    }

    /// Keep only the new entries of `entries` and advance the feed's watermark.
    pub fn new_entries(&self, feed_id: &str, mut entries: Vec<Entry>, key: DedupeKey) -> Vec<Entry> {
        let prior = self.store.get(feed_id);
        let verdict = classify(&entries, prior.as_deref(), key);

        if let Some(w) = verdict.watermark {
            tracing::debug!(
                feed = feed_id,
                %key,
                prior = ?prior,
                watermark = %w,
                matched = verdict.matched,
                "watermark advanced"
            );
            self.store.set(feed_id, w);
        }

        entries.truncate(verdict.fresh);
        entries
    }
}
