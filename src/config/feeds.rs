// src/config/feeds.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::dedupe::DedupeKey;

pub const DEFAULT_FEEDS_PATH: &str = "feeds.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedsConfig {
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

/// One watched feed. `id` keys the watermark and must stay stable across runs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub id: String,
    /// Display name used in notifications; defaults to `id`.
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub dedupe_key: DedupeKey,
    /// One summary notification per run instead of one per entry.
    #[serde(default)]
    pub aggregate: bool,
}

/// Load and validate the feeds file. TOML or JSON, picked by extension.
pub fn load_feeds(path: &Path) -> Result<FeedsConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feeds config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_feeds(&content, ext.as_str())
        .with_context(|| format!("parsing feeds config {}", path.display()))?;
    validate(cfg)
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<FeedsConfig> {
    let looks_like_json = s.trim_start().starts_with('{');
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        "yaml" | "yml" => bail!(
            "YAML feeds files are not supported; rewrite it as TOML `[[feeds]]` tables or JSON `{{\"feeds\": [...]}}`"
        ),
        _ if looks_like_json => Ok(serde_json::from_str(s)?),
        _ => toml::from_str(s).map_err(|e| anyhow!("unsupported feeds format: {e}")),
    }
}

fn validate(mut cfg: FeedsConfig) -> Result<FeedsConfig> {
    let mut seen = HashSet::new();
    for (i, feed) in cfg.feeds.iter_mut().enumerate() {
        feed.id = feed.id.trim().to_string();
        feed.url = feed.url.trim().to_string();
        feed.name = feed.name.trim().to_string();

        if feed.id.is_empty() {
            bail!("feed #{} has an empty id", i + 1);
        }
        if feed.url.is_empty() {
            bail!("feed `{}` has an empty url", feed.id);
        }
        if !seen.insert(feed.id.clone()) {
            bail!("duplicate feed id `{}`", feed.id);
        }
        if feed.name.is_empty() {
            feed.name = feed.id.clone();
        }
    }
    Ok(cfg)
}
