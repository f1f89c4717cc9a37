//! Entry summarization: provider abstraction, an OpenAI-compatible chat
//! completions client, and a file cache + daily limit wrapper.

pub mod cache;
pub mod openai;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::SummarizerConfig;

pub use cache::CachingSummarizer;
pub use openai::ChatCompletionsSummarizer;

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// True only when the summarizer is fully configured.
    fn is_enabled(&self) -> bool;

    async fn summarize(&self, title: &str, description: &str) -> Result<String>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynSummarizer = Arc<dyn Summarizer>;

/// Used when no summarization endpoint is configured.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn summarize(&self, _title: &str, _description: &str) -> Result<String> {
        bail!("summarizer is not enabled")
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Factory: disabled without config, otherwise the chat completions client,
/// wrapped in [`CachingSummarizer`] when a cache dir or daily limit is set.
pub fn build_summarizer(cfg: Option<&SummarizerConfig>) -> Result<DynSummarizer> {
    let Some(cfg) = cfg else {
        return Ok(Arc::new(DisabledSummarizer));
    };

    let client = ChatCompletionsSummarizer::new(cfg)?;
    if cfg.cache_dir.is_none() && cfg.daily_limit.is_none() {
        return Ok(Arc::new(client));
    }

    let namespace = format!("{}|{}", cfg.model, cfg.language);
    Ok(Arc::new(CachingSummarizer::new(
        client,
        cfg.cache_dir.clone(),
        cfg.daily_limit,
        namespace,
    )))
}
