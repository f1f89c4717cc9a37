// src/config/ai.rs
use std::path::PathBuf;

use super::{ProcessEnv, VarSource};

pub const DEFAULT_SUMMARY_LANGUAGE: &str = "Chinese";

/// Settings for the OpenAI-compatible summarization endpoint.
///
/// Only constructed when `API_ENDPOINT`, `API_KEY` and `MODEL_NAME` are all
/// set; otherwise summaries are disabled for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizerConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Language the summary is written in (`SUMMARY_LANGUAGE`).
    pub language: String,
    /// Cap on real API calls per UTC day (`SUMMARY_DAILY_LIMIT`).
    pub daily_limit: Option<u32>,
    /// On-disk summary cache (`SUMMARY_CACHE_DIR`).
    pub cache_dir: Option<PathBuf>,
}

impl SummarizerConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_vars(&ProcessEnv)
    }

    pub fn from_vars(vars: &impl VarSource) -> Option<Self> {
        let endpoint = vars.non_empty("API_ENDPOINT")?;
        let api_key = vars.non_empty("API_KEY")?;
        let model = vars.non_empty("MODEL_NAME")?;

        let daily_limit = vars.non_empty("SUMMARY_DAILY_LIMIT").and_then(|v| {
            v.parse::<u32>()
                .map_err(|_| tracing::warn!(value = %v, "ignoring invalid SUMMARY_DAILY_LIMIT"))
                .ok()
        });

        Some(Self {
            endpoint,
            api_key,
            model,
            language: vars
                .non_empty("SUMMARY_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_SUMMARY_LANGUAGE.to_string()),
            daily_limit,
            cache_dir: vars.non_empty("SUMMARY_CACHE_DIR").map(PathBuf::from),
        })
    }
}
