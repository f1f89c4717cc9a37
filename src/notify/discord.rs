use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Message, Notifier};
use crate::ingest::types::Entry;

/// Discord caps embed descriptions at 4096 characters.
const EMBED_DESCRIPTION_MAX: usize = 4000;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("building discord http client")?;
        Ok(Self {
            webhook,
            client,
            timeout: Duration::from_secs(5),
            max_retries: 3,
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn post(&self, msg: &Message) -> Result<()> {
        let payload = DiscordWebhookPayload::from_message(msg);

        let mut attempt: u8 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(attempt, error = %err, "retrying discord webhook");
            tokio::time::sleep(retry_delay(attempt)).await;
        }
    }
}

/// 500 ms doubling per attempt, capped at 32 s.
fn retry_delay(attempt: u8) -> Duration {
    let shift = u32::from(attempt.saturating_sub(1)).min(6);
    Duration::from_millis(500u64 << shift)
}

#[async_trait]
impl Notifier for DiscordNotifier {
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
        "discord"
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn from_message(msg: &Message) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: msg.title.clone(),
                description: super::truncate(&msg.body, EMBED_DESCRIPTION_MAX),
                url: msg.url.clone(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_payload_shape() {
        let msg = Message {
            title: "[Feed] 2 new items".into(),
            body: "a\nb".into(),
            group: "Feed".into(),
            url: None,
        };
        let v = serde_json::to_value(DiscordWebhookPayload::from_message(&msg)).unwrap();
        assert_eq!(v["content"], serde_json::Value::Null);
        assert_eq!(v["embeds"][0]["title"], "[Feed] 2 new items");
        assert_eq!(v["embeds"][0]["description"], "a\nb");
        assert!(v["embeds"][0].get("url").is_none());
    }

    #[test]
    fn retry_delay_doubles_then_caps() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(1_000));
        assert_eq!(retry_delay(7), Duration::from_secs(32));
        assert_eq!(retry_delay(65), Duration::from_secs(32));
        assert_eq!(retry_delay(u8::MAX), Duration::from_secs(32));
        assert_eq!(retry_delay(0), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        // Nothing listens on port 9 on loopback; every attempt fails fast.
        let n = DiscordNotifier::new("http://127.0.0.1:9/webhook".into())
            .unwrap()
            .with_timeout(1)
            .with_retries(1);
        let err = n.notify_aggregate("f", &[Entry::default()]).await.unwrap_err();
        assert!(err.to_string().contains("Discord webhook"));
    }
}
