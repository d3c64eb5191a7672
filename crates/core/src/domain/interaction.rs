use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub i64);

impl std::fmt::Display for InteractionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One logged contact event. Rows are insert-only; they reference the
/// customer by name text so a cascade delete can match them even when the
/// customer row itself is long gone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub customer_name: String,
    pub date: NaiveDate,
    pub report: String,
    pub follow_up_date: Option<NaiveDate>,
}
