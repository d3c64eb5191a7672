//! Telegram transport - Bot API adapter
//!
//! This crate is the chat-transport edge of rolodex:
//! - **Outbound** (`api`) - `Messenger` implementations over the Bot API
//!   (`sendMessage`, `sendDocument`), plus a no-op for offline runs
//! - **Inbound** (`updates`) - long-poll `getUpdates` runner with a
//!   reconnect policy, routing `/start`, `/export` and free-form text to
//!   a `ChatService`
//!
//! Everything behind the `UpdateSource` / `ChatService` seams is
//! replaceable, which is how the tests drive the runner with scripted
//! updates.

pub mod api;
pub mod updates;

pub use api::{HttpMessenger, NoopMessenger};
pub use updates::{
    ChatService, ChatServiceError, HttpUpdateSource, IncomingMessage, PollError, ReconnectPolicy,
    UpdateRunner, UpdateSource,
};
