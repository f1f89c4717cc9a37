//! Wiring for one watcher invocation: load configuration and state, build
//! the adapters, run the pipeline, persist the store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{load_feeds, NotifyConfig, SummarizerConfig};
use crate::ingest::fetcher::HttpFetcher;
use crate::ingest::parser::XmlFeedParser;
use crate::metrics::Metrics;
use crate::notify::NotifierMux;
use crate::runner::{Pipeline, RunReport, DEFAULT_CONCURRENCY};
use crate::state::WatermarkStore;
use crate::summarize::build_summarizer;

pub const DEFAULT_STATE_PATH: &str = "state/last_states.json";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    pub state: PathBuf,
    pub concurrency: usize,
    pub metrics_file: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config: PathBuf::from(crate::config::feeds::DEFAULT_FEEDS_PATH),
            state: PathBuf::from(DEFAULT_STATE_PATH),
            concurrency: DEFAULT_CONCURRENCY,
            metrics_file: None,
        }
    }
}

/// Build the production pipeline from environment configuration.
pub fn build_pipeline(concurrency: usize) -> Result<Pipeline> {
    let summarizer_cfg = SummarizerConfig::from_env();
    let summarizer = build_summarizer(summarizer_cfg.as_ref())?;
    if summarizer.is_enabled() {
        tracing::info!(provider = summarizer.provider_name(), "summaries enabled");
    } else {
        tracing::info!("summaries disabled (API_ENDPOINT, API_KEY, MODEL_NAME not all set)");
    }

    let mux = NotifierMux::from_config(&NotifyConfig::from_env())?;
    if mux.is_empty() {
        tracing::warn!("no notification channel configured; notifications will fail");
    } else {
        tracing::info!(channels = ?mux.channel_names(), "notification channels");
    }

    Ok(Pipeline::new(
        Arc::new(HttpFetcher::new()?),
        Arc::new(XmlFeedParser),
        summarizer,
        Arc::new(mux),
    )
    .with_concurrency(concurrency))
}

/// Load everything, run once, save. Errors are fatal to the process; feed
/// level failures only show up in the returned report.
pub async fn run(opts: &RunOptions, pipeline: &Pipeline) -> Result<RunReport> {
    let metrics = match &opts.metrics_file {
        Some(_) => Some(Metrics::init()?),
        None => {
            crate::metrics::describe();
            None
        }
    };

    let feeds = load_feeds(&opts.config)?;
    tracing::info!(path = %opts.config.display(), feeds = feeds.feeds.len(), "loaded feeds");

    let store = Arc::new(
        WatermarkStore::load(&opts.state)
            .with_context(|| format!("loading state {}", opts.state.display()))?,
    );
    tracing::info!(path = %opts.state.display(), known = store.len(), "loaded state");

    let report = pipeline.run(&feeds.feeds, store.clone()).await;

    let saved = store
        .save(&opts.state)
        .with_context(|| format!("saving state {}", opts.state.display()));

    crate::metrics::mark_run_finished();
    if let (Some(m), Some(path)) = (&metrics, &opts.metrics_file) {
        if let Err(e) = m.write_textfile(path) {
            tracing::warn!(error = %format!("{e:#}"), "could not write metrics file");
        }
    }

    saved?;
    Ok(report)
}
