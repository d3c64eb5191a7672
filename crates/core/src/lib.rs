pub mod config;
pub mod domain;
pub mod export;
pub mod messaging;

pub use chrono;

pub use domain::customer::{
    CascadeSummary, Customer, CustomerDetail, CustomerDraft, CustomerField, CustomerFilter,
    CustomerId, CustomerUpsert,
};
pub use domain::interaction::{Interaction, InteractionId};
pub use domain::reminder::{parse_due_at, Reminder, ReminderId};
pub use domain::ChatId;
pub use messaging::{Messenger, SendError};
