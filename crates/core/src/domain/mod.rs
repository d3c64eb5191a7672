use serde::{Deserialize, Serialize};

pub mod customer;
pub mod interaction;
pub mod reminder;

/// Identifies the chat a session belongs to and where its messages and
/// reminder notifications are delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
