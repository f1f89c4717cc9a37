// src/ingest/fetcher.rs
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use reqwest::{Client, StatusCode};

use crate::ingest::types::Fetcher;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_RETRIES: u32 = 2;
pub const USER_AGENT: &str = concat!(
    "feedwatch/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/feedwatch/feedwatch)"
);

/// HTTP GET with a per-request timeout and bounded retries.
///
/// Attempt `n` (1-based retry count) waits `backoff_unit * n²` first, so the
/// defaults give 1s then 4s.
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    backoff_unit: Duration,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self {
            client,
            retries: DEFAULT_RETRIES,
            backoff_unit: Duration::from_secs(1),
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("feed http get")?;

        let status = resp.status();
        if status != StatusCode::OK {
            bail!("unexpected status code: {}", status.as_u16());
        }

        let body = resp.bytes().await.context("reading feed body")?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let t0 = Instant::now();
        let mut last_err = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_unit * (attempt * attempt)).await;
            }

            match self.fetch_once(url).await {
                Ok(body) => {
                    histogram!(crate::metrics::FETCH_DURATION).record(t0.elapsed().as_secs_f64() * 1_000.0);
                    return Ok(body);
                }
                Err(e) => {
                    tracing::debug!(url, attempt, error = %format!("{e:#}"), "fetch attempt failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e.context(format!("failed after {} retries", self.retries))),
            None => Err(anyhow!("no fetch attempt made for {url}")),
        }
    }
}
