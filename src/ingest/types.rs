// src/ingest/types.rs
use anyhow::Result;
use time::OffsetDateTime;

/// One feed entry as produced by the parser.
///
/// `guid`, `link` and `title` are the identity candidates (any may be empty);
/// `summary` is filled in later by the summarizer and never takes part in
/// deduplication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub guid: String,
    pub link: String,
    pub title: String,
    pub description: String,
    pub published: Option<OffsetDateTime>,
    pub summary: Option<String>,
}

impl Entry {
    /// Text shown to humans: the generated summary when present, else the description.
    pub fn display_text(&self) -> &str {
        match self.summary.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => &self.description,
        }
    }
}

/// Raw feed download.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Turns raw feed bytes into entries, newest first (document order).
pub trait FeedParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<Vec<Entry>>;
}
