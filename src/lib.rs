// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod app;
pub mod config;
pub mod dedupe;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod runner;
pub mod state;
pub mod summarize;

pub use crate::dedupe::{classify, DedupeKey, Deduper, Verdict};
pub use crate::ingest::types::{Entry, FeedParser, Fetcher};
pub use crate::notify::{Notifier, NotifierMux};
pub use crate::runner::{FeedOutcome, Pipeline, RunReport};
pub use crate::state::WatermarkStore;
pub use crate::summarize::Summarizer;
