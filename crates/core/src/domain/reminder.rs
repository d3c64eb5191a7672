use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChatId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderId(pub i64);

impl std::fmt::Display for ReminderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A scheduled notification. `customer_name` is free text, not a foreign
/// key: a reminder may reference a customer that was never registered or
/// has since been deleted. `sent` transitions false -> true exactly once,
/// and only the scheduler flips it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub chat_id: ChatId,
    pub customer_name: Option<String>,
    pub text: String,
    pub due_at: DateTime<Utc>,
    pub sent: bool,
}

/// Parses a due timestamp from the forms the model produces: RFC 3339, or
/// the bare `YYYY-MM-DD HH:MM[:SS]` the original operators type. Bare
/// timestamps are taken as UTC.
pub fn parse_due_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }
    None
}
