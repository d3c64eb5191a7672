//! Agent runtime - tool orchestration over the CRM store
//!
//! This crate turns free-form operator messages into validated store
//! mutations:
//! - **Conversation State** (`conversation`) - per-chat append-only turn log
//! - **Language model** (`llm`) - `LlmClient` trait + Gemini REST client
//! - **Tool Registry** (`tools`) - schema-typed handlers over the store
//! - **Orchestration Loop** (`orchestrator`) - the two-call dispatch cycle
//!
//! The model is strictly a translator: it picks tools and narrates their
//! outcomes, but every business rule (dedup, validation, lookups) lives in
//! the tool layer and the store underneath it.

pub mod conversation;
pub mod llm;
pub mod orchestrator;
pub mod tools;

pub use conversation::{ConversationState, SessionStore, ToolCall, ToolResultRecord, Turn};
pub use llm::{GeminiClient, LlmClient, LlmError, ModelReply};
pub use orchestrator::{Orchestrator, OrchestratorError, MODEL_RETRY_REPLY};
pub use tools::{Tool, ToolContext, ToolOutcome, ToolRegistry, ToolSpec};
