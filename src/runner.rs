//! One batch run over every configured feed.
//!
//! Each feed gets its own task (fetch, parse, dedupe, summarize, notify),
//! admitted through a semaphore. Tasks share nothing but the watermark
//! store; a failing or panicking feed never cancels its siblings. Persisting
//! the store is left to the caller once [`Pipeline::run`] returns.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::FeedConfig;
use crate::dedupe::Deduper;
use crate::ingest::types::{Entry, FeedParser, Fetcher};
use crate::metrics::{ENTRIES_NEW, FEEDS_PROCESSED, FEED_ERRORS, NOTIFICATIONS, SUMMARIES};
use crate::notify::DynNotifier;
use crate::state::WatermarkStore;
use crate::summarize::DynSummarizer;

pub const DEFAULT_CONCURRENCY: usize = 8;

/// How a single feed's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    FetchFailed(String),
    ParseFailed(String),
    /// The feed parsed but had no entries; the watermark is untouched.
    Empty,
    NoNew,
    NotifyDisabled { new: usize },
    Notified { new: usize },
    /// Delivery failed. The watermark has already moved and stays moved.
    NotifyFailed { new: usize, error: String },
    /// The task panicked or could not be scheduled.
    Aborted(String),
}

impl FeedOutcome {
    /// Stage label used for `feed_errors_total`, `None` on success.
    pub fn error_stage(&self) -> Option<&'static str> {
        match self {
            FeedOutcome::FetchFailed(_) => Some("fetch"),
            FeedOutcome::ParseFailed(_) => Some("parse"),
            FeedOutcome::Empty => Some("empty"),
            FeedOutcome::NotifyFailed { .. } => Some("notify"),
            FeedOutcome::Aborted(_) => Some("task"),
            FeedOutcome::NoNew
            | FeedOutcome::NotifyDisabled { .. }
            | FeedOutcome::Notified { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error_stage().is_some()
    }

    pub fn new_entries(&self) -> usize {
        match self {
            FeedOutcome::NotifyDisabled { new }
            | FeedOutcome::Notified { new }
            | FeedOutcome::NotifyFailed { new, .. } => *new,
            _ => 0,
        }
    }
}

impl fmt::Display for FeedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedOutcome::FetchFailed(e) => write!(f, "fetch failed: {e}"),
            FeedOutcome::ParseFailed(e) => write!(f, "parse failed: {e}"),
            FeedOutcome::Empty => f.write_str("no entries"),
            FeedOutcome::NoNew => f.write_str("no new entries"),
            FeedOutcome::NotifyDisabled { new } => write!(f, "{new} new, notify off"),
            FeedOutcome::Notified { new } => write!(f, "{new} new, notified"),
            FeedOutcome::NotifyFailed { new, error } => {
                write!(f, "{new} new, notification failed: {error}")
            }
            FeedOutcome::Aborted(e) => write!(f, "aborted: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedReport {
    pub id: String,
    pub outcome: FeedOutcome,
}

/// Per-feed outcomes in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub feeds: Vec<FeedReport>,
}

impl RunReport {
    pub fn outcome(&self, feed_id: &str) -> Option<&FeedOutcome> {
        self.feeds.iter().find(|r| r.id == feed_id).map(|r| &r.outcome)
    }

    pub fn failures(&self) -> usize {
        self.feeds.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn new_entries(&self) -> usize {
        self.feeds.iter().map(|r| r.outcome.new_entries()).sum()
    }
}

/// The adapters a run needs, shared by every feed task.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn FeedParser>,
    summarizer: DynSummarizer,
    notifier: DynNotifier,
    max_concurrent: usize,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn FeedParser>,
        summarizer: DynSummarizer,
        notifier: DynNotifier,
    ) -> Self {
        Self {
            fetcher,
            parser,
            summarizer,
            notifier,
            max_concurrent: DEFAULT_CONCURRENCY,
        }
    }

    /// Values below 1 are raised to 1.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.max_concurrent
    }

    /// Process every feed and wait for all of them.
    pub async fn run(&self, feeds: &[FeedConfig], store: Arc<WatermarkStore>) -> RunReport {
        let sem = Arc::new(Semaphore::new(self.max_concurrent));
        let deduper = Deduper::new(store);
        let mut tasks = JoinSet::new();
        let mut task_ids = HashMap::new();

        for (idx, feed) in feeds.iter().enumerate() {
            let pipeline = self.clone();
            let deduper = deduper.clone();
            let sem = sem.clone();
            let feed = feed.clone();

            let handle = tasks.spawn(async move {
                let outcome = match sem.acquire_owned().await {
                    Ok(_permit) => pipeline.process_feed(&feed, &deduper).await,
                    Err(e) => FeedOutcome::Aborted(e.to_string()),
                };
                (idx, outcome)
            });
            task_ids.insert(handle.id(), idx);
        }

        tracing::info!(
            feeds = feeds.len(),
            concurrency = self.max_concurrent,
            "feed tasks spawned"
        );

        let mut outcomes: Vec<Option<FeedOutcome>> = vec![None; feeds.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "feed task panicked");
                    if let Some(&idx) = task_ids.get(&e.id()) {
                        counter!(FEED_ERRORS, "stage" => "task").increment(1);
                        outcomes[idx] = Some(FeedOutcome::Aborted(e.to_string()));
                    }
                }
            }
        }

        let report = RunReport {
            feeds: feeds
                .iter()
                .zip(outcomes)
                .map(|(feed, outcome)| FeedReport {
                    id: feed.id.clone(),
                    outcome: outcome
                        .unwrap_or_else(|| FeedOutcome::Aborted("task result lost".into())),
                })
                .collect(),
        };

        tracing::info!(
            feeds = report.feeds.len(),
            new_entries = report.new_entries(),
            failures = report.failures(),
            "run finished"
        );
        report
    }

    /// The full per-feed flow. Never fails; every problem becomes an outcome.
    pub async fn process_feed(&self, feed: &FeedConfig, deduper: &Deduper) -> FeedOutcome {
        let outcome = self.process_feed_inner(feed, deduper).await;
        counter!(FEEDS_PROCESSED).increment(1);
        match outcome.error_stage() {
            Some(stage) => {
                counter!(FEED_ERRORS, "stage" => stage).increment(1);
                tracing::warn!(feed = %feed.id, %outcome, "feed failed");
            }
            None => tracing::info!(feed = %feed.id, %outcome, "feed done"),
        }
        outcome
    }

    async fn process_feed_inner(&self, feed: &FeedConfig, deduper: &Deduper) -> FeedOutcome {
        let raw = match self.fetcher.fetch(&feed.url).await {
            Ok(raw) => raw,
            Err(e) => return FeedOutcome::FetchFailed(format!("{e:#}")),
        };

        let entries = match self.parser.parse(&raw) {
            Ok(entries) => entries,
            Err(e) => return FeedOutcome::ParseFailed(format!("{e:#}")),
        };
        if entries.is_empty() {
            return FeedOutcome::Empty;
        }
        let fetched = entries.len();

        let fresh = deduper.new_entries(&feed.id, entries, feed.dedupe_key);
        if fresh.is_empty() {
            return FeedOutcome::NoNew;
        }
        let new = fresh.len();
        counter!(ENTRIES_NEW).increment(new as u64);
        tracing::debug!(feed = %feed.id, fetched, new, "new entries");

        let fresh = self.summarize_all(&feed.id, fresh).await;

        if !feed.notify {
            return FeedOutcome::NotifyDisabled { new };
        }

        let sent = if feed.aggregate {
            self.notifier.notify_aggregate(&feed.name, &fresh).await
        } else {
            self.notifier.notify(&feed.name, &fresh).await
        };
        match sent {
            Ok(()) => {
                counter!(NOTIFICATIONS, "result" => "ok").increment(1);
                FeedOutcome::Notified { new }
            }
            Err(e) => {
                counter!(NOTIFICATIONS, "result" => "error").increment(1);
                FeedOutcome::NotifyFailed {
                    new,
                    error: format!("{e:#}"),
                }
            }
        }
    }

    /// Fill in summaries one entry at a time; a failure leaves that entry
    /// without one.
    async fn summarize_all(&self, feed_id: &str, mut entries: Vec<Entry>) -> Vec<Entry> {
        if !self.summarizer.is_enabled() {
            return entries;
        }
        for e in entries.iter_mut() {
            match self.summarizer.summarize(&e.title, &e.description).await {
                Ok(s) => {
                    counter!(SUMMARIES, "result" => "ok").increment(1);
                    e.summary = Some(s);
                }
                Err(err) => {
                    counter!(SUMMARIES, "result" => "error").increment(1);
                    tracing::warn!(
                        feed = feed_id,
                        title = %e.title,
                        provider = self.summarizer.provider_name(),
                        error = %format!("{err:#}"),
                        "summary failed"
                    );
                }
            }
        }
        entries
    }
}
