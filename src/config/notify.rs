// src/config/notify.rs
use super::{ProcessEnv, VarSource};

pub const DEFAULT_BARK_SERVER: &str = "https://api.day.app";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarkConfig {
    pub device_key: String,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub to: String,
}

/// Which notification channels are configured. A channel is `None` unless
/// every variable it needs is present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyConfig {
    pub bark: Option<BarkConfig>,
    pub slack_webhook: Option<String>,
    pub discord_webhook: Option<String>,
    pub email: Option<EmailConfig>,
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        Self::from_vars(&ProcessEnv)
    }

    pub fn from_vars(vars: &impl VarSource) -> Self {
        let bark = vars.non_empty("BARK_DEVICE_KEY").map(|device_key| BarkConfig {
            device_key,
            server: vars
                .non_empty("BARK_SERVER")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BARK_SERVER.to_string()),
        });

        let email = (|| {
            Some(EmailConfig {
                host: vars.non_empty("SMTP_HOST")?,
                user: vars.non_empty("SMTP_USER")?,
                pass: vars.non_empty("SMTP_PASS")?,
                from: vars.non_empty("NOTIFY_EMAIL_FROM")?,
                to: vars.non_empty("NOTIFY_EMAIL_TO")?,
            })
        })();

        Self {
            bark,
            slack_webhook: vars.non_empty("SLACK_WEBHOOK_URL"),
            discord_webhook: vars.non_empty("DISCORD_WEBHOOK_URL"),
            email,
        }
    }

    pub fn channel_count(&self) -> usize {
        [
            self.bark.is_some(),
            self.slack_webhook.is_some(),
            self.discord_webhook.is_some(),
            self.email.is_some(),
        ]
        .into_iter()
        .filter(|on| *on)
        .count()
    }
}
