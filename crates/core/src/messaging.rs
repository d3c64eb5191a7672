use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ChatId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("message delivery failed: {0}")]
pub struct SendError(pub String);

/// Outbound messaging collaborator. Implemented by the chat transport;
/// consumed by the orchestration layer and the reminder scheduler.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), SendError>;

    async fn send_file(
        &self,
        chat: ChatId,
        filename: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), SendError>;
}
