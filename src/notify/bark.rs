use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};

use super::{Message, Notifier};
use crate::config::BarkConfig;
use crate::ingest::types::Entry;

const BARK_TIMEOUT: Duration = Duration::from_secs(10);

/// Bark push: `GET {server}/{device_key}/{title}/{body}?group=..&url=..`.
pub struct BarkNotifier {
    server: Url,
    device_key: String,
    client: Client,
}

impl BarkNotifier {
    pub fn new(cfg: &BarkConfig) -> Result<Self> {
        let server = Url::parse(&cfg.server)
            .with_context(|| format!("invalid BARK_SERVER {:?}", cfg.server))?;
        if server.cannot_be_a_base() {
            bail!("BARK_SERVER cannot be used as a base url: {}", cfg.server);
        }
        let client = Client::builder()
            .timeout(BARK_TIMEOUT)
            .build()
            .context("building bark http client")?;
        Ok(Self {
            server,
            device_key: cfg.device_key.clone(),
            client,
        })
    }

    pub fn push_url(&self, msg: &Message) -> Result<Url> {
        let mut url = self.server.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("bark server url has no path"))?
            .pop_if_empty()
            .push(&self.device_key)
            .push(&msg.title)
            .push(&msg.body);
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("group", &msg.group);
            if let Some(link) = &msg.url {
                q.append_pair("url", link);
            }
        }
        Ok(url)
    }

    async fn send(&self, msg: &Message) -> Result<()> {
        let url = self.push_url(msg)?;
        let rsp = self.client.get(url).send().await.context("bark request")?;
        let status = rsp.status();
        if !status.is_success() {
            bail!("bark API returned status {}", status.as_u16());
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for BarkNotifier {
    async fn notify(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
        for e in entries {
            self.send(&Message::for_entry(feed_name, e)).await?;
        }
        Ok(())
    }

    async fn notify_aggregate(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.send(&Message::for_batch(feed_name, entries)).await
    }

    fn name(&self) -> &'static str {
        "bark"
    }
}
