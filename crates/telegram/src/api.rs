use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use rolodex_core::config::TelegramConfig;
use rolodex_core::domain::ChatId;
use rolodex_core::messaging::{Messenger, SendError};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API messenger: `sendMessage` for text, `sendDocument` for files.
pub struct HttpMessenger {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl HttpMessenger {
    pub fn new(config: &TelegramConfig) -> Result<Self, SendError> {
        Self::with_base_url(config, TELEGRAM_API_BASE)
    }

    pub fn with_base_url(config: &TelegramConfig, base_url: &str) -> Result<Self, SendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| SendError(error.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token.expose_secret(), method)
    }

    async fn check(&self, response: reqwest::Response) -> Result<(), SendError> {
        let status = response.status();
        let envelope = response
            .json::<ApiEnvelope>()
            .await
            .map_err(|error| SendError(format!("invalid api response: {error}")))?;

        if !status.is_success() || !envelope.ok {
            let description = envelope.description.unwrap_or_else(|| "no description".to_string());
            return Err(SendError(format!("telegram api status {status}: {description}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for HttpMessenger {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), SendError> {
        let response = self
            .http
            .post(self.endpoint("sendMessage"))
            .json(&json!({ "chat_id": chat.0, "text": text }))
            .send()
            .await
            .map_err(|error| SendError(error.to_string()))?;

        self.check(response).await
    }

    async fn send_file(
        &self,
        chat: ChatId,
        filename: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), SendError> {
        let document = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("text/csv")
            .map_err(|error| SendError(error.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat.0.to_string())
            .text("caption", caption.to_string())
            .part("document", document);

        let response = self
            .http
            .post(self.endpoint("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|error| SendError(error.to_string()))?;

        self.check(response).await
    }
}

/// Messenger that accepts everything and sends nothing. Keeps the process
/// runnable without a bot token.
#[derive(Default)]
pub struct NoopMessenger;

#[async_trait]
impl Messenger for NoopMessenger {
    async fn send_text(&self, _chat: ChatId, _text: &str) -> Result<(), SendError> {
        Ok(())
    }

    async fn send_file(
        &self,
        _chat: ChatId,
        _filename: &str,
        _bytes: Vec<u8>,
        _caption: &str,
    ) -> Result<(), SendError> {
        Ok(())
    }
}
