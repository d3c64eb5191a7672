use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use rolodex_core::domain::ChatId;

use crate::conversation::{SessionStore, ToolCall, ToolResultRecord};
use crate::llm::{LlmClient, LlmError, ModelReply};
use crate::tools::{ToolContext, ToolOutcome, ToolRegistry};

/// Reply shown to the operator when the language model is unreachable.
/// Conversation state stays intact, so retrying loses nothing.
pub const MODEL_RETRY_REPLY: &str =
    "The assistant is temporarily unavailable. Please try again shortly.";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("language model is unavailable: {0}")]
    UpstreamModel(#[from] LlmError),
}

/// Drives one user turn through the request/response/tool-execution
/// cycle: model call, ordered tool dispatch, model call again for the
/// final narration.
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self { llm, registry, sessions }
    }

    pub async fn reset_session(&self, chat: ChatId) -> bool {
        self.sessions.reset(chat).await
    }

    pub async fn handle_message(
        &self,
        chat: ChatId,
        text: &str,
    ) -> Result<String, OrchestratorError> {
        let correlation_id = Uuid::new_v4().to_string();
        let specs = self.registry.specs();
        let directive = system_directive(chat);

        // Turns within one session are strictly sequential; the session
        // mutex is held for the whole cycle.
        let session = self.sessions.session(chat).await;
        let mut state = session.lock().await;
        state.push_user(text);

        let reply = match self.llm.complete(&directive, state.turns(), &specs).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "agent.orchestrator.model_call_failed",
                    correlation_id = %correlation_id,
                    chat_id = %chat,
                    phase = "model_call_1",
                    error = %error,
                    "first model call failed; user turn retained for retry"
                );
                return Err(error.into());
            }
        };

        let calls = match reply {
            ModelReply::Text(text) => {
                state.push_model_reply(&text);
                info!(
                    event_name = "agent.orchestrator.direct_reply",
                    correlation_id = %correlation_id,
                    chat_id = %chat,
                    "model answered without tool calls"
                );
                return Ok(text);
            }
            ModelReply::ToolCalls(calls) => calls,
        };

        state.push_tool_calls(calls.clone());

        let mut outcomes = Vec::with_capacity(calls.len());
        for call in &calls {
            let outcome = self.dispatch(call, chat).await;
            info!(
                event_name = "agent.orchestrator.tool_dispatched",
                correlation_id = %correlation_id,
                chat_id = %chat,
                tool = %call.name,
                ok = outcome.ok,
                "tool call executed"
            );
            outcomes.push(ToolResultRecord {
                tool: call.name.clone(),
                ok: outcome.ok,
                message: outcome.message,
            });
        }
        state.push_tool_results(outcomes.clone());

        let final_reply = match self.llm.complete(&directive, state.turns(), &specs).await {
            Ok(reply) => reply,
            Err(error) => {
                // Tool side effects are already committed; only the
                // narration is lost.
                warn!(
                    event_name = "agent.orchestrator.model_call_failed",
                    correlation_id = %correlation_id,
                    chat_id = %chat,
                    phase = "model_call_2",
                    error = %error,
                    "synthesis call failed after tool dispatch"
                );
                return Err(error.into());
            }
        };

        let text = match final_reply {
            ModelReply::Text(text) => text,
            ModelReply::ToolCalls(_) => {
                // One dispatch round per turn. A second tool request is
                // model drift; answer from the outcomes we already have.
                warn!(
                    event_name = "agent.orchestrator.unexpected_tool_request",
                    correlation_id = %correlation_id,
                    chat_id = %chat,
                    "model requested tools during synthesis; summarizing outcomes instead"
                );
                outcomes
                    .iter()
                    .map(|outcome| outcome.message.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        state.push_model_reply(&text);
        Ok(text)
    }

    async fn dispatch(&self, call: &ToolCall, chat: ChatId) -> ToolOutcome {
        let Some(tool) = self.registry.get(&call.name) else {
            return ToolOutcome::failure(format!("unknown tool `{}`", call.name));
        };

        if !matches!(call.args, Value::Object(_)) {
            return ToolOutcome::failure(format!(
                "tool `{}` arguments must be an object",
                call.name
            ));
        }

        tool.execute(&call.args, &ToolContext { chat_id: chat }).await
    }
}

fn system_directive(chat: ChatId) -> String {
    format!(
        "You are a CRM assistant with persistent memory. Your duties: \
         1. Record and update customer data, log interaction reports and schedule reminders \
         through the provided tools, calling a tool as soon as its required arguments have been \
         collected across the conversation. \
         2. Answer report requests with the get_report tool and summarize the results. \
         3. After every successful write, add one short paragraph of actionable follow-up advice \
         (best time to call, next step, competitive angle). \
         Rules: ask for missing required fields instead of guessing them; always reply in the \
         operator's language, in a friendly tone; when calling set_reminder, target chat id {chat}."
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use rolodex_core::domain::ChatId;
    use rolodex_db::store::{CrmStore, InMemoryCrmStore};

    use crate::conversation::{SessionStore, ToolCall, Turn};
    use crate::llm::{LlmClient, LlmError, ModelReply};
    use crate::tools::{ToolRegistry, ToolSpec};

    use super::{Orchestrator, OrchestratorError};

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
        seen_turn_counts: Mutex<Vec<usize>>,
    }

    impl ScriptedLlm {
        fn with_script(replies: Vec<Result<ModelReply, LlmError>>) -> Self {
            Self { replies: Mutex::new(replies.into()), seen_turn_counts: Mutex::new(Vec::new()) }
        }

        async fn seen_turn_counts(&self) -> Vec<usize> {
            self.seen_turn_counts.lock().await.clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _system_directive: &str,
            turns: &[Turn],
            _tools: &[ToolSpec],
        ) -> Result<ModelReply, LlmError> {
            self.seen_turn_counts.lock().await.push(turns.len());
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(LlmError::Empty))
        }
    }

    fn upsert_call(name: &str, phone: &str) -> ToolCall {
        ToolCall {
            name: "manage_customer".to_string(),
            args: json!({"name": name, "phone": phone}),
        }
    }

    fn harness(
        script: Vec<Result<ModelReply, LlmError>>,
    ) -> (Orchestrator, Arc<InMemoryCrmStore>, Arc<SessionStore>, Arc<ScriptedLlm>) {
        let store = Arc::new(InMemoryCrmStore::default());
        let registry = Arc::new(ToolRegistry::builtin(store.clone()));
        let sessions = Arc::new(SessionStore::default());
        let llm = Arc::new(ScriptedLlm::with_script(script));
        let orchestrator = Orchestrator::new(llm.clone(), registry, sessions.clone());
        (orchestrator, store, sessions, llm)
    }

    #[tokio::test]
    async fn single_shot_registration_appends_exactly_four_turns() {
        let (orchestrator, store, sessions, _llm) = harness(vec![
            Ok(ModelReply::ToolCalls(vec![upsert_call("John", "555-0100")])),
            Ok(ModelReply::Text("John is registered, id 1.".to_string())),
        ]);
        let chat = ChatId(7);

        let reply = orchestrator
            .handle_message(chat, "register John, phone 555-0100")
            .await
            .expect("turn succeeds");

        assert!(!reply.is_empty());
        assert_eq!(sessions.turn_count(chat).await, 4);

        let session = sessions.session(chat).await;
        let state = session.lock().await;
        assert!(state.is_well_formed());
        assert!(matches!(state.turns()[0], Turn::User { .. }));
        assert!(matches!(state.turns()[1], Turn::ModelToolCalls { .. }));
        assert!(matches!(state.turns()[2], Turn::ToolResults { .. }));
        assert!(matches!(state.turns()[3], Turn::ModelReply { .. }));

        let customer =
            store.find_customer("John", Some("555-0100")).await.expect("find").expect("created");
        assert_eq!(customer.name, "John");
    }

    #[tokio::test]
    async fn information_split_across_turns_results_in_one_upsert() {
        let (orchestrator, store, sessions, llm) = harness(vec![
            Ok(ModelReply::Text("What is John's phone number?".to_string())),
            Ok(ModelReply::ToolCalls(vec![upsert_call("John", "555-0100")])),
            Ok(ModelReply::Text("Registered John with 555-0100.".to_string())),
        ]);
        let chat = ChatId(7);

        orchestrator.handle_message(chat, "talked to John today").await.expect("first turn");
        orchestrator.handle_message(chat, "his phone is 555-0100").await.expect("second turn");

        // The second model call sees the whole history: both user turns
        // plus the clarification reply.
        assert_eq!(llm.seen_turn_counts().await, vec![1, 3, 5]);
        assert_eq!(sessions.turn_count(chat).await, 6);

        let customers = store.list_customers().await.expect("list");
        assert_eq!(customers.len(), 1, "both turns must reconcile into exactly one upsert");
    }

    #[tokio::test]
    async fn unknown_tool_request_becomes_a_failure_outcome_not_a_crash() {
        let (orchestrator, _store, sessions, _llm) = harness(vec![
            Ok(ModelReply::ToolCalls(vec![
                ToolCall { name: "export_database".to_string(), args: json!({}) },
                upsert_call("John", "555-0100"),
            ])),
            Ok(ModelReply::Text("I registered John; I cannot export from here.".to_string())),
        ]);
        let chat = ChatId(7);

        orchestrator.handle_message(chat, "export everything and add John").await.expect("turn");

        let session = sessions.session(chat).await;
        let state = session.lock().await;
        let Turn::ToolResults { outcomes } = &state.turns()[2] else {
            panic!("third turn should be tool results");
        };
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].ok);
        assert!(outcomes[0].message.contains("unknown tool `export_database`"));
        assert!(outcomes[1].ok, "a failed call must not abort later calls");
    }

    #[tokio::test]
    async fn synthesis_failure_keeps_committed_side_effects_and_state() {
        let (orchestrator, store, sessions, _llm) = harness(vec![
            Ok(ModelReply::ToolCalls(vec![upsert_call("John", "555-0100")])),
            Err(LlmError::Api { status: 503, body: "overloaded".to_string() }),
        ]);
        let chat = ChatId(7);

        let error = orchestrator
            .handle_message(chat, "register John, phone 555-0100")
            .await
            .expect_err("synthesis call fails");
        assert!(matches!(error, OrchestratorError::UpstreamModel(_)));

        // The upsert stays committed and the log is still well formed, so
        // a retry re-presents full context.
        assert!(store.find_customer("John", None).await.expect("find").is_some());
        assert_eq!(sessions.turn_count(chat).await, 3);
        let session = sessions.session(chat).await;
        assert!(session.lock().await.is_well_formed());
    }

    #[tokio::test]
    async fn first_model_call_failure_retains_the_user_turn() {
        let (orchestrator, _store, sessions, _llm) =
            harness(vec![Err(LlmError::Api { status: 500, body: "boom".to_string() })]);
        let chat = ChatId(7);

        let error =
            orchestrator.handle_message(chat, "hello").await.expect_err("model unavailable");
        assert!(matches!(error, OrchestratorError::UpstreamModel(_)));
        assert_eq!(sessions.turn_count(chat).await, 1);
    }

    #[tokio::test]
    async fn reminder_tool_receives_the_session_chat_id() {
        let (orchestrator, store, _sessions, _llm) = harness(vec![
            Ok(ModelReply::ToolCalls(vec![ToolCall {
                name: "set_reminder".to_string(),
                args: json!({"text": "call John", "due_at": "2026-08-10 09:30"}),
            }])),
            Ok(ModelReply::Text("Reminder set.".to_string())),
        ]);
        let chat = ChatId(9001);

        orchestrator.handle_message(chat, "remind me to call John").await.expect("turn");

        let due = store
            .due_unsent_reminders(chrono::Utc::now() + chrono::Duration::days(365))
            .await
            .expect("due");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].chat_id, chat);
    }

    #[tokio::test]
    async fn tool_request_during_synthesis_is_summarized_not_redispatched() {
        let (orchestrator, store, _sessions, _llm) = harness(vec![
            Ok(ModelReply::ToolCalls(vec![upsert_call("John", "555-0100")])),
            Ok(ModelReply::ToolCalls(vec![upsert_call("John", "555-0100")])),
        ]);
        let chat = ChatId(7);

        let reply = orchestrator.handle_message(chat, "register John").await.expect("turn");
        assert!(reply.contains("Registered customer `John`"));

        let customers = store.list_customers().await.expect("list");
        assert_eq!(customers.len(), 1, "the drifted second request must not execute");
    }

    #[tokio::test]
    async fn reset_clears_the_session_log() {
        let (orchestrator, _store, sessions, _llm) =
            harness(vec![Ok(ModelReply::Text("hi".to_string()))]);
        let chat = ChatId(7);

        orchestrator.handle_message(chat, "hello").await.expect("turn");
        assert_eq!(sessions.turn_count(chat).await, 2);

        assert!(orchestrator.reset_session(chat).await);
        assert_eq!(sessions.turn_count(chat).await, 0);
    }
}
