use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::{Message, Notifier};
use crate::ingest::types::Entry;

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building slack http client")?;
        Ok(Self {
            webhook_url,
            client,
        })
    }

    pub fn payload(msg: &Message) -> serde_json::Value {
        let mut text = format!("*{}*\n{}", msg.title, msg.body);
        if let Some(u) = &msg.url {
            text.push_str(&format!("\n<{u}>"));
        }
        serde_json::json!({ "text": text })
    }

    async fn post(&self, msg: &Message) -> Result<()> {
        self.client
            .post(&self.webhook_url)
            .json(&Self::payload(msg))
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
        for e in entries {
            self.post(&Message::for_entry(feed_name, e)).await?;
        }
        Ok(())
    }

    async fn notify_aggregate(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.post(&Message::for_batch(feed_name, entries)).await
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}
