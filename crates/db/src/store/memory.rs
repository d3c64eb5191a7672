use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use rolodex_core::domain::customer::{
    CascadeSummary, Customer, CustomerDetail, CustomerDraft, CustomerFilter, CustomerId,
    CustomerUpsert,
};
use rolodex_core::domain::interaction::{Interaction, InteractionId};
use rolodex_core::domain::reminder::{Reminder, ReminderId};
use rolodex_core::domain::ChatId;

use super::{validate_draft, CrmStore, StoreError};

/// Storage port backed by plain vectors. Used by orchestration, scheduler
/// and CLI tests where spinning up SQLite adds nothing.
#[derive(Default)]
pub struct InMemoryCrmStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    customers: Vec<Customer>,
    interactions: Vec<Interaction>,
    reminders: Vec<Reminder>,
    next_customer_id: i64,
    next_interaction_id: i64,
    next_reminder_id: i64,
}

impl Inner {
    fn find_customer(&self, name: &str, phone: Option<&str>) -> Option<&Customer> {
        let name = name.trim();
        match phone {
            Some(phone) => self.customers.iter().find(|customer| {
                customer.name.eq_ignore_ascii_case(name) && customer.phone == phone.trim()
            }),
            None => {
                self.customers.iter().find(|customer| customer.name.eq_ignore_ascii_case(name))
            }
        }
    }
}

fn normalized(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

#[async_trait]
impl CrmStore for InMemoryCrmStore {
    async fn find_customer(
        &self,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Option<Customer>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.find_customer(name, phone).cloned())
    }

    async fn upsert_customer(&self, draft: CustomerDraft) -> Result<CustomerUpsert, StoreError> {
        validate_draft(&draft)?;

        let mut inner = self.inner.write().await;

        let existing_index = inner.customers.iter().position(|customer| {
            customer.name.eq_ignore_ascii_case(draft.name.trim())
                && customer.phone == draft.phone.trim()
        });
        if let Some(index) = existing_index {
            let mut customer = inner.customers[index].clone();
            if !customer.absorb(&draft) {
                return Ok(CustomerUpsert::Unchanged(customer));
            }
            inner.customers[index] = customer.clone();
            return Ok(CustomerUpsert::Updated(customer));
        }

        if let Some(owner) =
            inner.customers.iter().find(|customer| customer.phone == draft.phone.trim())
        {
            return Err(StoreError::Conflict(format!(
                "phone `{}` already belongs to customer `{}` (id {})",
                draft.phone.trim(),
                owner.name,
                owner.id
            )));
        }

        inner.next_customer_id += 1;
        let customer = Customer {
            id: CustomerId(inner.next_customer_id),
            name: draft.name.trim().to_string(),
            phone: draft.phone.trim().to_string(),
            company: normalized(draft.company.as_deref()),
            industry: normalized(draft.industry.as_deref()),
            services: normalized(draft.services.as_deref()),
        };
        inner.customers.push(customer.clone());
        Ok(CustomerUpsert::Created(customer))
    }

    async fn delete_customer(
        &self,
        name: &str,
        phone: Option<&str>,
    ) -> Result<CascadeSummary, StoreError> {
        let mut inner = self.inner.write().await;

        let Some(customer) = inner.find_customer(name, phone).cloned() else {
            return Err(StoreError::NotFound(format!("customer `{}`", name.trim())));
        };

        let interactions_before = inner.interactions.len();
        inner
            .interactions
            .retain(|interaction| !interaction.customer_name.eq_ignore_ascii_case(&customer.name));
        let interactions_removed = (interactions_before - inner.interactions.len()) as u64;

        let reminders_before = inner.reminders.len();
        inner.reminders.retain(|reminder| {
            reminder
                .customer_name
                .as_deref()
                .map(|reminder_name| !reminder_name.eq_ignore_ascii_case(&customer.name))
                .unwrap_or(true)
        });
        let reminders_removed = (reminders_before - inner.reminders.len()) as u64;

        inner.customers.retain(|existing| existing.id != customer.id);

        Ok(CascadeSummary { interactions_removed, reminders_removed })
    }

    async fn add_interaction(
        &self,
        customer_name: &str,
        report: &str,
        follow_up_date: Option<NaiveDate>,
    ) -> Result<Interaction, StoreError> {
        if report.trim().is_empty() {
            return Err(StoreError::Validation("interaction report is required".to_string()));
        }

        let mut inner = self.inner.write().await;
        let Some(customer) = inner.find_customer(customer_name, None).cloned() else {
            return Err(StoreError::NotFound(format!("customer `{}`", customer_name.trim())));
        };

        inner.next_interaction_id += 1;
        let interaction = Interaction {
            id: InteractionId(inner.next_interaction_id),
            customer_name: customer.name,
            date: Utc::now().date_naive(),
            report: report.trim().to_string(),
            follow_up_date,
        };
        inner.interactions.push(interaction.clone());
        Ok(interaction)
    }

    async fn query_customers(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.customers.iter().filter(|customer| filter.matches(customer)).cloned().collect())
    }

    async fn get_customer_detail(&self, name: &str) -> Result<CustomerDetail, StoreError> {
        let inner = self.inner.read().await;
        let Some(customer) = inner.find_customer(name, None).cloned() else {
            return Err(StoreError::NotFound(format!("customer `{}`", name.trim())));
        };

        let mut interactions: Vec<Interaction> = inner
            .interactions
            .iter()
            .filter(|interaction| interaction.customer_name.eq_ignore_ascii_case(&customer.name))
            .cloned()
            .collect();
        interactions.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.0.cmp(&a.id.0)));

        Ok(CustomerDetail { customer, interactions })
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.customers.clone())
    }

    async fn add_reminder(
        &self,
        chat_id: ChatId,
        customer_name: Option<&str>,
        text: &str,
        due_at: DateTime<Utc>,
    ) -> Result<Reminder, StoreError> {
        if text.trim().is_empty() {
            return Err(StoreError::Validation("reminder text is required".to_string()));
        }

        let mut inner = self.inner.write().await;
        inner.next_reminder_id += 1;
        let reminder = Reminder {
            id: ReminderId(inner.next_reminder_id),
            chat_id,
            customer_name: normalized(customer_name),
            text: text.trim().to_string(),
            due_at,
            sent: false,
        };
        inner.reminders.push(reminder.clone());
        Ok(reminder)
    }

    async fn due_unsent_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reminder>, StoreError> {
        let inner = self.inner.read().await;
        let mut due: Vec<Reminder> = inner
            .reminders
            .iter()
            .filter(|reminder| !reminder.sent && reminder.due_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at).then(a.id.0.cmp(&b.id.0)));
        Ok(due)
    }

    async fn mark_sent(&self, id: ReminderId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let Some(reminder) = inner.reminders.iter_mut().find(|reminder| reminder.id == id) else {
            return Err(StoreError::NotFound(format!("reminder {id}")));
        };
        reminder.sent = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use rolodex_core::domain::customer::{CustomerDraft, CustomerUpsert};
    use rolodex_core::domain::ChatId;

    use super::InMemoryCrmStore;
    use crate::store::{CrmStore, StoreError};

    fn draft(name: &str, phone: &str) -> CustomerDraft {
        CustomerDraft { name: name.to_string(), phone: phone.to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn upsert_find_round_trip_matches_sql_semantics() {
        let store = InMemoryCrmStore::default();
        let created = store.upsert_customer(draft("Nouri", "555-0100")).await.expect("create");
        assert!(matches!(created, CustomerUpsert::Created(_)));

        let found = store.find_customer("NOURI", None).await.expect("find").expect("present");
        assert_eq!(found.phone, "555-0100");

        let unchanged = store.upsert_customer(draft("Nouri", "555-0100")).await.expect("again");
        assert!(matches!(unchanged, CustomerUpsert::Unchanged(_)));
    }

    #[tokio::test]
    async fn phone_conflict_and_cascade_behave_like_sql_store() {
        let store = InMemoryCrmStore::default();
        store.upsert_customer(draft("Nouri", "555-0100")).await.expect("create");

        let conflict =
            store.upsert_customer(draft("Karimi", "555-0100")).await.expect_err("conflict");
        assert!(matches!(conflict, StoreError::Conflict(_)));

        store.add_interaction("Nouri", "intro call", None).await.expect("interaction");
        store
            .add_reminder(ChatId(1), Some("Nouri"), "call back", Utc::now())
            .await
            .expect("reminder");

        let summary = store.delete_customer("Nouri", None).await.expect("delete");
        assert_eq!(summary.interactions_removed, 1);
        assert_eq!(summary.reminders_removed, 1);
    }

    #[tokio::test]
    async fn due_reminders_are_ordered_and_respect_sent_flag() {
        let store = InMemoryCrmStore::default();
        let now = Utc::now();
        let later =
            store.add_reminder(ChatId(1), None, "later", now - Duration::minutes(1)).await.unwrap();
        let earlier =
            store.add_reminder(ChatId(1), None, "earlier", now - Duration::minutes(10)).await.unwrap();

        let due = store.due_unsent_reminders(now).await.expect("due");
        assert_eq!(due.iter().map(|r| r.id).collect::<Vec<_>>(), vec![earlier.id, later.id]);

        store.mark_sent(earlier.id).await.expect("mark");
        let due = store.due_unsent_reminders(now).await.expect("due again");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, later.id);
    }
}
