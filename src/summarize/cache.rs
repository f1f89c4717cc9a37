// src/summarize/cache.rs
//! Caching wrapper around a [`Summarizer`]: optional on-disk cache keyed by a
//! SHA-256 of the request, optional cap on real calls per UTC day.
//! Cache hits never count against the cap.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Summarizer;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct CachedSummary {
    summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn roll_over(&mut self) {
        let now = today();
        if self.date != now {
            self.date = now;
            self.count = 0;
        }
    }
}

pub struct CachingSummarizer<S: Summarizer> {
    inner: S,
    cache_dir: Option<PathBuf>,
    daily_limit: Option<u32>,
    namespace: String,
    counter: Mutex<DailyCounter>,
}

impl<S: Summarizer> CachingSummarizer<S> {
    /// `namespace` separates cache entries of different models/languages.
    pub fn new(
        inner: S,
        cache_dir: Option<PathBuf>,
        daily_limit: Option<u32>,
        namespace: impl Into<String>,
    ) -> Self {
        let counter = cache_dir
            .as_deref()
            .and_then(|dir| {
                if let Err(e) = fs::create_dir_all(dir) {
                    tracing::warn!(dir = %dir.display(), error = %e, "summary cache dir unavailable");
                }
                load_daily_counter(dir).ok()
            })
            .unwrap_or_default();

        Self {
            inner,
            cache_dir,
            daily_limit,
            namespace: namespace.into(),
            counter: Mutex::new(counter),
        }
    }

    /// Real calls made today.
    pub fn calls_today(&self) -> u32 {
        let mut g = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        g.roll_over();
        g.count
    }

    fn cache_key(&self, title: &str, description: &str) -> String {
        let mut hasher = Sha256::new();
        for part in [self.namespace.as_str(), title, description] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher
            .finalize()
            .iter()
            .take(16)
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Reserve one call against the daily limit.
    fn reserve(&self) -> Result<()> {
        let mut g = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        g.roll_over();
        if let Some(limit) = self.daily_limit {
            if g.count >= limit {
                bail!("daily summary limit of {limit} reached");
            }
        }
        g.count = g.count.saturating_add(1);
        self.persist_counter(&g);
        Ok(())
    }

    /// Give back a reservation whose call failed.
    fn refund(&self) {
        let mut g = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        g.count = g.count.saturating_sub(1);
        self.persist_counter(&g);
    }

    fn persist_counter(&self, counter: &DailyCounter) {
        if let Some(dir) = &self.cache_dir {
            if let Err(e) = save_daily_counter(dir, counter) {
                tracing::debug!(error = %e, "could not persist summary counter");
            }
        }
    }
}

#[async_trait]
impl<S: Summarizer> Summarizer for CachingSummarizer<S> {
    fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    async fn summarize(&self, title: &str, description: &str) -> Result<String> {
        let key = self.cache_key(title, description);
        if let Some(dir) = &self.cache_dir {
            if let Some(hit) = read_cache_file(dir, &key) {
                return Ok(hit.summary);
            }
        }

        self.reserve()?;
        let summary = match self.inner.summarize(title, description).await {
            Ok(s) => s,
            Err(e) => {
                self.refund();
                return Err(e);
            }
        };

        if let Some(dir) = &self.cache_dir {
            let entry = CachedSummary {
                summary: summary.clone(),
            };
            if let Err(e) = write_cache_file(dir, &key, &entry) {
                tracing::debug!(error = %e, "could not write summary cache");
            }
        }
        Ok(summary)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CachedSummary> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&s).ok()
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec(value)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&json)?;
    fs::rename(tmp, path)
}

fn write_cache_file(dir: &Path, key: &str, value: &CachedSummary) -> io::Result<()> {
    write_json_atomic(&cache_path(dir, key), value)
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    write_json_atomic(&counter_path(dir), dc)
}
