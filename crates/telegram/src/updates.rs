use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rolodex_core::config::TelegramConfig;
use rolodex_core::domain::ChatId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("update source failed to connect: {0}")]
    Connect(String),
    #[error("update source read failed: {0}")]
    Receive(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("chat service failure: {0}")]
pub struct ChatServiceError(pub String);

/// One inbound operator message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub text: String,
}

/// Source of inbound message batches. `Ok(None)` means the stream closed
/// cleanly.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn next_batch(&self) -> Result<Option<Vec<IncomingMessage>>, PollError>;
}

/// Receiver for routed inbound traffic. Implemented by the server's chat
/// layer; each method failure is logged and the pump keeps running.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn handle_reset(&self, chat: ChatId) -> Result<(), ChatServiceError>;
    async fn handle_export(&self, chat: ChatId) -> Result<(), ChatServiceError>;
    async fn handle_message(&self, chat: ChatId, text: &str) -> Result<(), ChatServiceError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Long-poll pump: pulls message batches from the source and routes each
/// message to the chat service, reconnecting with backoff on failures.
pub struct UpdateRunner {
    source: Arc<dyn UpdateSource>,
    service: Arc<dyn ChatService>,
    reconnect_policy: ReconnectPolicy,
}

impl UpdateRunner {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        service: Arc<dyn ChatService>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { source, service, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(poll_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %poll_error,
                        "update polling failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "update polling retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn pump(&self, attempt: u32) -> Result<(), PollError> {
        info!(attempt, "update polling started");

        loop {
            let Some(messages) = self.source.next_batch().await? else {
                info!(attempt, "update stream closed");
                return Ok(());
            };

            for message in messages {
                debug!(
                    event_name = "ingress.telegram.message_received",
                    chat_id = %message.chat_id,
                    "received operator message"
                );

                let outcome = match route(&message.text) {
                    RoutedMessage::Reset => self.service.handle_reset(message.chat_id).await,
                    RoutedMessage::Export => self.service.handle_export(message.chat_id).await,
                    RoutedMessage::FreeForm(text) => {
                        self.service.handle_message(message.chat_id, text).await
                    }
                };

                if let Err(error) = outcome {
                    warn!(
                        chat_id = %message.chat_id,
                        error = %error,
                        "message handling failed; continuing update loop"
                    );
                }
            }
        }
    }
}

enum RoutedMessage<'a> {
    Reset,
    Export,
    FreeForm(&'a str),
}

fn route(text: &str) -> RoutedMessage<'_> {
    // Commands may carry the bot-name suffix (`/start@rolodex_bot`).
    let trimmed = text.trim();
    let command = trimmed.split_whitespace().next().unwrap_or("");
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/start" => RoutedMessage::Reset,
        "/export" => RoutedMessage::Export,
        _ => RoutedMessage::FreeForm(trimmed),
    }
}

/// Bot API `getUpdates` long-poll source. Tracks the last confirmed
/// update id so each update is consumed once.
pub struct HttpUpdateSource {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
    poll_timeout_secs: u64,
    next_offset: Mutex<Option<i64>>,
}

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

impl HttpUpdateSource {
    pub fn new(config: &TelegramConfig) -> Result<Self, PollError> {
        Self::with_base_url(config, TELEGRAM_API_BASE)
    }

    pub fn with_base_url(config: &TelegramConfig, base_url: &str) -> Result<Self, PollError> {
        let http = reqwest::Client::builder()
            // The request blocks server-side for the poll window; give the
            // client room on top of it.
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .map_err(|error| PollError::Connect(error.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            next_offset: Mutex::new(None),
        })
    }
}

#[async_trait]
impl UpdateSource for HttpUpdateSource {
    async fn next_batch(&self) -> Result<Option<Vec<IncomingMessage>>, PollError> {
        let offset = *self.next_offset.lock().await;
        let url = format!(
            "{}/bot{}/getUpdates",
            self.base_url,
            self.bot_token.expose_secret()
        );

        let mut body = json!({ "timeout": self.poll_timeout_secs });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|error| PollError::Receive(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Receive(format!("getUpdates returned status {status}")));
        }

        let payload = response
            .json::<GetUpdatesResponse>()
            .await
            .map_err(|error| PollError::Receive(error.to_string()))?;
        if !payload.ok {
            return Err(PollError::Receive("getUpdates returned ok=false".to_string()));
        }

        let mut messages = Vec::new();
        let mut highest_update_id = offset.map(|value| value - 1);
        for update in payload.result {
            highest_update_id =
                Some(highest_update_id.map_or(update.update_id, |seen| seen.max(update.update_id)));

            let Some(message) = update.message else { continue };
            let Some(text) = message.text else { continue };
            messages.push(IncomingMessage { chat_id: ChatId(message.chat.id), text });
        }

        if let Some(highest) = highest_update_id {
            *self.next_offset.lock().await = Some(highest + 1);
        }

        Ok(Some(messages))
    }
}

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<UpdatePayload>,
}

#[derive(Debug, Deserialize)]
struct UpdatePayload {
    update_id: i64,
    #[serde(default)]
    message: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    chat: ChatPayload,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    id: i64,
}
