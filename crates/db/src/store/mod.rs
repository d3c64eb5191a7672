use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use rolodex_core::domain::customer::{
    CascadeSummary, Customer, CustomerDetail, CustomerDraft, CustomerFilter, CustomerUpsert,
};
use rolodex_core::domain::interaction::Interaction;
use rolodex_core::domain::reminder::{Reminder, ReminderId};
use rolodex_core::domain::ChatId;

pub mod memory;
pub mod sql;

pub use memory::InMemoryCrmStore;
pub use sql::SqlCrmStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl StoreError {
    /// True for failures caused by the backing store being unreachable or
    /// broken, as opposed to the caller's input.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Decode(_))
    }
}

/// The storage port. All operations are individually atomic and safe to
/// call concurrently from the orchestration loop and the scheduler; there
/// is no cross-operation transaction.
#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Case-insensitive name match. With a phone the (name, phone) pair
    /// must match exactly; without one, the first name-only match wins
    /// (ambiguous under duplicate names, kept for compatibility).
    async fn find_customer(
        &self,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Option<Customer>, StoreError>;

    async fn upsert_customer(&self, draft: CustomerDraft) -> Result<CustomerUpsert, StoreError>;

    /// Removes the customer and every interaction and reminder whose
    /// `customer_name` matches the deleted customer's name.
    async fn delete_customer(
        &self,
        name: &str,
        phone: Option<&str>,
    ) -> Result<CascadeSummary, StoreError>;

    /// Dates the interaction with the operation's current date.
    async fn add_interaction(
        &self,
        customer_name: &str,
        report: &str,
        follow_up_date: Option<NaiveDate>,
    ) -> Result<Interaction, StoreError>;

    async fn query_customers(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, StoreError>;

    async fn get_customer_detail(&self, name: &str) -> Result<CustomerDetail, StoreError>;

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;

    async fn add_reminder(
        &self,
        chat_id: ChatId,
        customer_name: Option<&str>,
        text: &str,
        due_at: DateTime<Utc>,
    ) -> Result<Reminder, StoreError>;

    /// Scheduler-only: reminders with `due_at <= now` and `sent = false`,
    /// ordered by due time.
    async fn due_unsent_reminders(&self, now: DateTime<Utc>)
        -> Result<Vec<Reminder>, StoreError>;

    /// Scheduler-only: flips `sent` false -> true.
    async fn mark_sent(&self, id: ReminderId) -> Result<(), StoreError>;
}

pub(crate) fn validate_draft(draft: &CustomerDraft) -> Result<(), StoreError> {
    if draft.name.trim().is_empty() {
        return Err(StoreError::Validation("customer name is required".to_string()));
    }
    if draft.phone.trim().is_empty() {
        return Err(StoreError::Validation("customer phone is required".to_string()));
    }
    Ok(())
}
