use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message as Mail};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Message, Notifier};
use crate::config::EmailConfig;
use crate::ingest::types::Entry;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(cfg: &EmailConfig) -> Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .with_context(|| format!("invalid SMTP_HOST {:?}", cfg.host))?
            .credentials(creds)
            .build();

        let from = cfg.from.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = cfg.to.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Self { mailer, from, to })
    }

    fn build(&self, msg: &Message) -> Result<Mail> {
        Mail::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(msg.title.clone())
            .header(header::ContentType::TEXT_PLAIN)
            .body(msg.as_text())
            .context("build email")
    }

    async fn send(&self, msg: &Message) -> Result<()> {
        let mail = self.build(msg)?;
        self.mailer.send(mail).await.context("send email")?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
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
        "email"
    }
}
