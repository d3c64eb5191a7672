use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use rolodex_agent::{Orchestrator, OrchestratorError, MODEL_RETRY_REPLY};
use rolodex_core::domain::ChatId;
use rolodex_core::export::{customers_csv, export_filename};
use rolodex_core::messaging::Messenger;
use rolodex_db::store::CrmStore;
use rolodex_telegram::{ChatService, ChatServiceError};

const WELCOME_REPLY: &str = "🤖 Rolodex CRM assistant\n\n\
Send any free-form message and I will register customers, log call reports, \
schedule reminders and answer report questions.\n\n\
Examples:\n\
 - \"Talked to Mr. Nouri, he said competitor pricing is higher.\"\n\
 - \"Remind me next Monday 10:00 to follow up with Nouri.\"\n\
 - \"/export\" sends the full customer list as a CSV file.";

const EXPORT_EMPTY_REPLY: &str =
    "⚠️ The customer database is empty; there is nothing to export yet.";
const EXPORT_FAILED_REPLY: &str =
    "❌ The customer store is temporarily unavailable; export failed.";
const EXPORT_CAPTION: &str = "Full CRM customer export (CSV)";

/// Routes inbound chat traffic into the orchestration loop and the export
/// surface, replying through the messenger.
pub struct CrmChatService {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn CrmStore>,
    messenger: Arc<dyn Messenger>,
}

impl CrmChatService {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn CrmStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self { orchestrator, store, messenger }
    }

    async fn reply(&self, chat: ChatId, text: &str) -> Result<(), ChatServiceError> {
        self.messenger
            .send_text(chat, text)
            .await
            .map_err(|error| ChatServiceError(error.to_string()))
    }
}

#[async_trait]
impl ChatService for CrmChatService {
    async fn handle_reset(&self, chat: ChatId) -> Result<(), ChatServiceError> {
        let had_session = self.orchestrator.reset_session(chat).await;
        info!(
            event_name = "server.chat.session_reset",
            chat_id = %chat,
            had_session,
            "conversation state cleared"
        );
        self.reply(chat, WELCOME_REPLY).await
    }

    async fn handle_export(&self, chat: ChatId) -> Result<(), ChatServiceError> {
        let customers = match self.store.list_customers().await {
            Ok(customers) => customers,
            Err(error) => {
                info!(
                    event_name = "server.chat.export_failed",
                    chat_id = %chat,
                    error = %error,
                    "customer export failed"
                );
                return self.reply(chat, EXPORT_FAILED_REPLY).await;
            }
        };

        if customers.is_empty() {
            return self.reply(chat, EXPORT_EMPTY_REPLY).await;
        }

        let csv = customers_csv(&customers);
        let filename = export_filename(Utc::now().date_naive());
        self.messenger
            .send_file(chat, &filename, csv.into_bytes(), EXPORT_CAPTION)
            .await
            .map_err(|error| ChatServiceError(error.to_string()))
    }

    async fn handle_message(&self, chat: ChatId, text: &str) -> Result<(), ChatServiceError> {
        match self.orchestrator.handle_message(chat, text).await {
            Ok(reply) => self.reply(chat, &reply).await,
            Err(OrchestratorError::UpstreamModel(error)) => {
                info!(
                    event_name = "server.chat.model_unavailable",
                    chat_id = %chat,
                    error = %error,
                    "surfacing generic retry reply"
                );
                self.reply(chat, MODEL_RETRY_REPLY).await
            }
        }
    }
}
