use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use rolodex_core::domain::ChatId;

/// One tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

/// The executed outcome of one tool call, in dispatch order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub tool: String,
    pub ok: bool,
    pub message: String,
}

/// One entry of the conversation log. A `ToolResults` turn always follows
/// the `ToolCalls` turn that requested it, and a model synthesis turn
/// follows the results; the state only exposes appends that keep that
/// pairing intact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Turn {
    User { text: String },
    ModelReply { text: String },
    ModelToolCalls { calls: Vec<ToolCall> },
    ToolResults { outcomes: Vec<ToolResultRecord> },
}

/// Append-only per-session turn log. Unbounded: there is no trimming
/// policy, the whole log is replayed to the model on every call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::User { text: text.into() });
    }

    pub fn push_model_reply(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::ModelReply { text: text.into() });
    }

    pub fn push_tool_calls(&mut self, calls: Vec<ToolCall>) {
        self.turns.push(Turn::ModelToolCalls { calls });
    }

    /// Panics in debug builds when the previous turn is not the tool-call
    /// request these results answer.
    pub fn push_tool_results(&mut self, outcomes: Vec<ToolResultRecord>) {
        debug_assert!(
            matches!(self.turns.last(), Some(Turn::ModelToolCalls { .. })),
            "tool results must directly follow the requesting model turn"
        );
        self.turns.push(Turn::ToolResults { outcomes });
    }

    /// Checks the pairing invariant over the whole log: every tool-call
    /// turn is immediately followed by a tool-result turn, and every
    /// tool-result turn is immediately preceded by one.
    pub fn is_well_formed(&self) -> bool {
        for (index, turn) in self.turns.iter().enumerate() {
            match turn {
                Turn::ModelToolCalls { .. } => {
                    if !matches!(self.turns.get(index + 1), Some(Turn::ToolResults { .. })) {
                        // The in-flight tail may legitimately end on a
                        // tool-call turn while dispatch is running.
                        if index + 1 != self.turns.len() {
                            return false;
                        }
                    }
                }
                Turn::ToolResults { .. } => {
                    let preceded = index > 0
                        && matches!(self.turns.get(index - 1), Some(Turn::ModelToolCalls { .. }));
                    if !preceded {
                        return false;
                    }
                }
                Turn::User { .. } | Turn::ModelReply { .. } => {}
            }
        }
        true
    }
}

/// Owns one `ConversationState` per chat. Each session is guarded by its
/// own mutex so turns within a session are strictly sequential while
/// distinct sessions proceed independently.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<ChatId, Arc<Mutex<ConversationState>>>>,
}

impl SessionStore {
    pub async fn session(&self, chat: ChatId) -> Arc<Mutex<ConversationState>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&chat) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions.entry(chat).or_insert_with(Arc::default).clone()
    }

    /// Clears the session, returning whether one existed. Used by the
    /// explicit reset command; nothing else ever discards turns.
    pub async fn reset(&self, chat: ChatId) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&chat).is_some()
    }

    pub async fn turn_count(&self, chat: ChatId) -> usize {
        let session = self.session(chat).await;
        let state = session.lock().await;
        state.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use rolodex_core::domain::ChatId;

    use super::{ConversationState, SessionStore, ToolCall, ToolResultRecord, Turn};

    #[test]
    fn appended_turns_keep_pairing_invariant() {
        let mut state = ConversationState::default();
        state.push_user("register John, phone 555-0100");
        state.push_tool_calls(vec![ToolCall {
            name: "manage_customer".to_string(),
            args: json!({"name": "John", "phone": "555-0100"}),
        }]);
        state.push_tool_results(vec![ToolResultRecord {
            tool: "manage_customer".to_string(),
            ok: true,
            message: "Registered customer `John` (id 1).".to_string(),
        }]);
        state.push_model_reply("John is registered.");

        assert_eq!(state.len(), 4);
        assert!(state.is_well_formed());
    }

    #[test]
    fn orphan_tool_results_violate_the_invariant() {
        let state = ConversationState {
            turns: vec![
                Turn::User { text: "hi".to_string() },
                Turn::ToolResults { outcomes: vec![] },
            ],
        };
        assert!(!state.is_well_formed());
    }

    #[tokio::test]
    async fn sessions_are_created_on_first_use_and_cleared_on_reset() {
        let store = SessionStore::default();
        let chat = ChatId(42);

        {
            let session = store.session(chat).await;
            let mut state = session.lock().await;
            state.push_user("hello");
        }
        assert_eq!(store.turn_count(chat).await, 1);

        assert!(store.reset(chat).await);
        assert_eq!(store.turn_count(chat).await, 0);
        assert!(!store.reset(ChatId(43)).await);
    }

    #[tokio::test]
    async fn sessions_for_distinct_chats_do_not_share_state() {
        let store = SessionStore::default();

        {
            let session = store.session(ChatId(1)).await;
            session.lock().await.push_user("first chat");
        }

        assert_eq!(store.turn_count(ChatId(1)).await, 1);
        assert_eq!(store.turn_count(ChatId(2)).await, 0);
    }
}
