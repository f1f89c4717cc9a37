// src/summarize/openai.rs
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Summarizer;
use crate::config::SummarizerConfig;
use crate::ingest::fetcher::USER_AGENT;

pub const SUMMARY_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest article text (in chars) sent to the model.
pub const MAX_CONTENT_CHARS: usize = 8000;

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsSummarizer {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    language: String,
}

impl ChatCompletionsSummarizer {
    pub fn new(cfg: &SummarizerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(SUMMARY_TIMEOUT)
            .build()
            .context("building summarizer http client")?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            language: cfg.language.clone(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[async_trait]
impl Summarizer for ChatCompletionsSummarizer {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn summarize(&self, title: &str, description: &str) -> Result<String> {
        let prompt = build_prompt(title, description, &self.language);
        let req = ChatRequest {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: &prompt,
            }],
            temperature: 0.7,
            max_tokens: 500,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("sending summary request")?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.context("reading summary response")?;
        interpret_response(status, &body)
    }

    fn provider_name(&self) -> &'static str {
        "chat-completions"
    }
}

/// Turn a raw HTTP answer into summary text. Response bodies are never echoed
/// into errors, only their length.
pub fn interpret_response(status: u16, body: &[u8]) -> Result<String> {
    if status != 200 {
        if let Ok(ErrorEnvelope { error: Some(e) }) = serde_json::from_slice::<ErrorEnvelope>(body) {
            bail!("API error (status {status}): {} (type: {})", e.message, e.kind);
        }
        bail!(
            "API returned status {status} (response length: {} bytes)",
            body.len()
        );
    }

    if body.is_empty() {
        bail!("empty response body");
    }

    let parsed: ChatResponse = serde_json::from_slice(body).map_err(|e| {
        anyhow!(
            "failed to parse response (invalid JSON): {e} (response length: {} bytes)",
            body.len()
        )
    })?;

    if let Some(e) = parsed.error {
        bail!("API error: {} (type: {})", e.message, e.kind);
    }

    let choice = parsed
        .choices
        .first()
        .ok_or_else(|| anyhow!("no choices in API response"))?;

    let summary = choice.message.content.trim();
    if summary.is_empty() {
        bail!("empty summary from API");
    }
    Ok(summary.to_string())
}

/// Prompt asking for a short summary in `language`; article text is capped at
/// [`MAX_CONTENT_CHARS`].
pub fn build_prompt(title: &str, description: &str, language: &str) -> String {
    let mut content = title.to_string();
    if !description.is_empty() {
        content.push_str("\n\n");
        content.push_str(description);
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        content = content.chars().take(MAX_CONTENT_CHARS).collect();
        content.push_str("...");
    }

    format!(
        "Write a concise summary of the following article in {language}. Requirements:\n\
         1. Keep the summary under 100 words\n\
         2. Highlight the core points and key information\n\
         3. Use plain, clear language\n\
         4. If the article is written in another language, translate the summary into {language}\n\
         \n\
         Article title: {title}\n\
         \n\
         Article content:\n\
         {content}\n\
         \n\
         Output only the summary, without any prefix or explanation."
    )
}
