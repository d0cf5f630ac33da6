//! Operator notification channel.
//!
//! Every outbound message goes through [`Notifier::send_text`]; implementations
//! truncate to [`MESSAGE_LIMIT`] characters before delivery.

pub mod format;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::TelegramConfig;
use crate::errors::{PipelineError, Result};

pub const MESSAGE_LIMIT: usize = 4000;
pub const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Cut `text` to at most [`MESSAGE_LIMIT`] characters, suffix included.
pub fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        return text.to_string();
    }
    let keep = MESSAGE_LIMIT - TRUNCATION_SUFFIX.chars().count();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_SUFFIX);
    out
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<()>;
}

/// Fallback when no chat is configured: messages go to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, text: &str) -> Result<()> {
        info!(target: "fundbot_backend::notify", "📨 {}", truncate_message(text));
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Telegram Bot API `sendMessage`, plain text.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(PipelineError::Configuration("bot token is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, text: &str) -> Result<()> {
        let message = truncate_message(text);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": message,
            "disable_web_page_preview": true,
        });

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let parsed: Option<BotApiResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(r) if status.is_success() && r.ok => {
                debug!(length = message.len(), "sent Telegram message");
                Ok(())
            }
            Some(r) if !status.is_success() => Err(PipelineError::HttpStatus {
                status: status.as_u16(),
                body: r.description.unwrap_or(body),
            }),
            Some(r) => Err(PipelineError::Vendor {
                code: r.error_code.map(|c| c.to_string()).unwrap_or_default(),
                body: r.description.unwrap_or(body),
            }),
            None if !status.is_success() => Err(PipelineError::HttpStatus {
                status: status.as_u16(),
                body,
            }),
            None => Err(PipelineError::Vendor {
                code: "unparseable".to_string(),
                body,
            }),
        }
    }
}
