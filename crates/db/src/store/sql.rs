use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use rolodex_core::domain::customer::{
    CascadeSummary, Customer, CustomerDetail, CustomerDraft, CustomerField, CustomerFilter,
    CustomerId, CustomerUpsert,
};
use rolodex_core::domain::interaction::{Interaction, InteractionId};
use rolodex_core::domain::reminder::{Reminder, ReminderId};
use rolodex_core::domain::ChatId;

use super::{validate_draft, CrmStore, StoreError};
use crate::DbPool;

const CUSTOMER_COLUMNS: &str = "id, name, phone, company, industry, services";
const REMINDER_COLUMNS: &str = "id, chat_id, customer_name, reminder_text, due_at, sent";
const INTERACTION_COLUMNS: &str = "id, customer_name, interaction_date, report, follow_up_date";

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqlCrmStore {
    pool: DbPool,
}

impl SqlCrmStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn customer_by_name_and_phone(
        &self,
        name: &str,
        phone: &str,
    ) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer
             WHERE name = ? COLLATE NOCASE AND phone = ?
             ORDER BY id ASC LIMIT 1",
        ))
        .bind(name.trim())
        .bind(phone.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(customer_from_row).transpose()
    }

    async fn customer_by_name(&self, name: &str) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer
             WHERE name = ? COLLATE NOCASE
             ORDER BY id ASC LIMIT 1",
        ))
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(customer_from_row).transpose()
    }

    async fn phone_owner(&self, phone: &str) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer WHERE phone = ? LIMIT 1",
        ))
        .bind(phone.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(customer_from_row).transpose()
    }
}

#[async_trait]
impl CrmStore for SqlCrmStore {
    async fn find_customer(
        &self,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Option<Customer>, StoreError> {
        match phone {
            Some(phone) => self.customer_by_name_and_phone(name, phone).await,
            None => self.customer_by_name(name).await,
        }
    }

    async fn upsert_customer(&self, draft: CustomerDraft) -> Result<CustomerUpsert, StoreError> {
        validate_draft(&draft)?;

        if let Some(mut existing) = self.customer_by_name_and_phone(&draft.name, &draft.phone).await?
        {
            if !existing.absorb(&draft) {
                return Ok(CustomerUpsert::Unchanged(existing));
            }

            sqlx::query(
                "UPDATE customer SET company = ?, industry = ?, services = ? WHERE id = ?",
            )
            .bind(existing.company.as_deref())
            .bind(existing.industry.as_deref())
            .bind(existing.services.as_deref())
            .bind(existing.id.0)
            .execute(&self.pool)
            .await?;

            return Ok(CustomerUpsert::Updated(existing));
        }

        if let Some(owner) = self.phone_owner(&draft.phone).await? {
            return Err(StoreError::Conflict(format!(
                "phone `{}` already belongs to customer `{}` (id {})",
                draft.phone.trim(),
                owner.name,
                owner.id
            )));
        }

        let result = sqlx::query(
            "INSERT INTO customer (name, phone, company, industry, services)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(draft.name.trim())
        .bind(draft.phone.trim())
        .bind(normalized(draft.company.as_deref()))
        .bind(normalized(draft.industry.as_deref()))
        .bind(normalized(draft.services.as_deref()))
        .execute(&self.pool)
        .await
        .map_err(|error| conflict_on_unique_violation(error, &draft.phone))?;

        Ok(CustomerUpsert::Created(Customer {
            id: CustomerId(result.last_insert_rowid()),
            name: draft.name.trim().to_string(),
            phone: draft.phone.trim().to_string(),
            company: normalized(draft.company.as_deref()).map(str::to_string),
            industry: normalized(draft.industry.as_deref()).map(str::to_string),
            services: normalized(draft.services.as_deref()).map(str::to_string),
        }))
    }

    async fn delete_customer(
        &self,
        name: &str,
        phone: Option<&str>,
    ) -> Result<CascadeSummary, StoreError> {
        let Some(customer) = self.find_customer(name, phone).await? else {
            return Err(StoreError::NotFound(format!("customer `{}`", name.trim())));
        };

        let interactions = sqlx::query(
            "DELETE FROM interaction WHERE customer_name = ? COLLATE NOCASE",
        )
        .bind(&customer.name)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let reminders =
            sqlx::query("DELETE FROM reminder WHERE customer_name = ? COLLATE NOCASE")
                .bind(&customer.name)
                .execute(&self.pool)
                .await?
                .rows_affected();

        sqlx::query("DELETE FROM customer WHERE id = ?")
            .bind(customer.id.0)
            .execute(&self.pool)
            .await?;

        Ok(CascadeSummary { interactions_removed: interactions, reminders_removed: reminders })
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

        let Some(customer) = self.customer_by_name(customer_name).await? else {
            return Err(StoreError::NotFound(format!("customer `{}`", customer_name.trim())));
        };

        let date = Utc::now().date_naive();
        let result = sqlx::query(
            "INSERT INTO interaction (customer_name, interaction_date, report, follow_up_date)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&customer.name)
        .bind(date.format(DATE_FORMAT).to_string())
        .bind(report.trim())
        .bind(follow_up_date.map(|value| value.format(DATE_FORMAT).to_string()))
        .execute(&self.pool)
        .await?;

        Ok(Interaction {
            id: InteractionId(result.last_insert_rowid()),
            customer_name: customer.name,
            date,
            report: report.trim().to_string(),
            follow_up_date,
        })
    }

    async fn query_customers(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, StoreError> {
        let column = match filter.field {
            CustomerField::Name => "name",
            CustomerField::Phone => "phone",
            CustomerField::Company => "company",
            CustomerField::Industry => "industry",
            CustomerField::Services => "services",
        };

        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer
             WHERE LOWER(IFNULL({column}, '')) LIKE '%' || LOWER(?) || '%'
             ORDER BY id ASC",
        ))
        .bind(filter.needle.trim())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(customer_from_row).collect()
    }

    async fn get_customer_detail(&self, name: &str) -> Result<CustomerDetail, StoreError> {
        let Some(customer) = self.customer_by_name(name).await? else {
            return Err(StoreError::NotFound(format!("customer `{}`", name.trim())));
        };

        let rows = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM interaction
             WHERE customer_name = ? COLLATE NOCASE
             ORDER BY interaction_date DESC, id DESC",
        ))
        .bind(&customer.name)
        .fetch_all(&self.pool)
        .await?;

        let interactions =
            rows.into_iter().map(interaction_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(CustomerDetail { customer, interactions })
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let rows =
            sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customer ORDER BY id ASC"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(customer_from_row).collect()
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

        let result = sqlx::query(
            "INSERT INTO reminder (chat_id, customer_name, reminder_text, due_at, sent)
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(chat_id.0)
        .bind(normalized(customer_name))
        .bind(text.trim())
        .bind(fmt_timestamp(due_at))
        .execute(&self.pool)
        .await?;

        Ok(Reminder {
            id: ReminderId(result.last_insert_rowid()),
            chat_id,
            customer_name: normalized(customer_name).map(str::to_string),
            text: text.trim().to_string(),
            due_at,
            sent: false,
        })
    }

    async fn due_unsent_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reminder>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminder
             WHERE sent = 0 AND due_at <= ?
             ORDER BY due_at ASC, id ASC",
        ))
        .bind(fmt_timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(reminder_from_row).collect()
    }

    async fn mark_sent(&self, id: ReminderId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE reminder SET sent = 1 WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("reminder {id}")));
        }

        Ok(())
    }
}

/// Fixed-width UTC form (`2026-08-07T09:30:00Z`) so lexicographic `<=` in
/// SQL matches chronological order.
fn fmt_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn normalized(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn conflict_on_unique_violation(error: sqlx::Error, phone: &str) -> StoreError {
    if let sqlx::Error::Database(ref database_error) = error {
        if database_error.is_unique_violation() {
            return StoreError::Conflict(format!(
                "phone `{}` already belongs to another customer",
                phone.trim()
            ));
        }
    }
    StoreError::Database(error)
}

fn customer_from_row(row: SqliteRow) -> Result<Customer, StoreError> {
    Ok(Customer {
        id: CustomerId(row.try_get("id")?),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        company: row.try_get("company")?,
        industry: row.try_get("industry")?,
        services: row.try_get("services")?,
    })
}

fn interaction_from_row(row: SqliteRow) -> Result<Interaction, StoreError> {
    let date_raw: String = row.try_get("interaction_date")?;
    let date = parse_date(&date_raw)?;
    let follow_up_raw: Option<String> = row.try_get("follow_up_date")?;
    let follow_up_date = follow_up_raw.as_deref().map(parse_date).transpose()?;

    Ok(Interaction {
        id: InteractionId(row.try_get("id")?),
        customer_name: row.try_get("customer_name")?,
        date,
        report: row.try_get("report")?,
        follow_up_date,
    })
}

fn reminder_from_row(row: SqliteRow) -> Result<Reminder, StoreError> {
    let due_raw: String = row.try_get("due_at")?;
    let due_at = DateTime::parse_from_rfc3339(&due_raw)
        .map_err(|_| StoreError::Decode(format!("invalid reminder due_at `{due_raw}`")))?
        .with_timezone(&Utc);

    Ok(Reminder {
        id: ReminderId(row.try_get("id")?),
        chat_id: ChatId(row.try_get("chat_id")?),
        customer_name: row.try_get("customer_name")?,
        text: row.try_get("reminder_text")?,
        due_at,
        sent: row.try_get::<i64, _>("sent")? != 0,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| StoreError::Decode(format!("invalid date `{raw}`")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use rolodex_core::domain::customer::{
        CustomerDraft, CustomerField, CustomerFilter, CustomerUpsert,
    };
    use rolodex_core::domain::ChatId;

    use super::SqlCrmStore;
    use crate::store::{CrmStore, StoreError};
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlCrmStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlCrmStore::new(pool)
    }

    fn draft(name: &str, phone: &str) -> CustomerDraft {
        CustomerDraft { name: name.to_string(), phone: phone.to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn upsert_then_find_round_trip() {
        let store = store().await;
        let created = store
            .upsert_customer(CustomerDraft {
                industry: Some("manufacturing".to_string()),
                ..draft("Nouri", "555-0100")
            })
            .await
            .expect("upsert");

        let CustomerUpsert::Created(created) = created else {
            panic!("first upsert should create");
        };

        let found = store
            .find_customer("nouri", Some("555-0100"))
            .await
            .expect("find")
            .expect("customer present");

        assert_eq!(found, created);
        assert_eq!(found.industry.as_deref(), Some("manufacturing"));
    }

    #[tokio::test]
    async fn identical_reupsert_reports_unchanged() {
        let store = store().await;
        store
            .upsert_customer(CustomerDraft {
                company: Some("Arman Steel".to_string()),
                ..draft("Nouri", "555-0100")
            })
            .await
            .expect("create");

        let second = store
            .upsert_customer(CustomerDraft {
                company: Some("Arman Steel".to_string()),
                ..draft("Nouri", "555-0100")
            })
            .await
            .expect("re-upsert");

        assert!(matches!(second, CustomerUpsert::Unchanged(_)));
    }

    #[tokio::test]
    async fn reupsert_with_new_field_updates_only_that_field() {
        let store = store().await;
        store
            .upsert_customer(CustomerDraft {
                company: Some("Arman Steel".to_string()),
                ..draft("Nouri", "555-0100")
            })
            .await
            .expect("create");

        let updated = store
            .upsert_customer(CustomerDraft {
                industry: Some("metals".to_string()),
                ..draft("Nouri", "555-0100")
            })
            .await
            .expect("update");

        let CustomerUpsert::Updated(customer) = updated else {
            panic!("second upsert should update");
        };
        assert_eq!(customer.company.as_deref(), Some("Arman Steel"));
        assert_eq!(customer.industry.as_deref(), Some("metals"));
    }

    #[tokio::test]
    async fn duplicate_phone_for_new_customer_is_a_conflict() {
        let store = store().await;
        store.upsert_customer(draft("Nouri", "555-0100")).await.expect("create");

        let error = store
            .upsert_customer(draft("Karimi", "555-0100"))
            .await
            .expect_err("phone is taken");

        assert!(matches!(error, StoreError::Conflict(_)));
        assert!(error.to_string().contains("555-0100"));
    }

    #[tokio::test]
    async fn missing_required_fields_fail_validation() {
        let store = store().await;
        let error = store.upsert_customer(draft("", "555-0100")).await.expect_err("no name");
        assert!(matches!(error, StoreError::Validation(_)));

        let error = store.upsert_customer(draft("Nouri", "  ")).await.expect_err("no phone");
        assert!(matches!(error, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn interaction_for_unknown_customer_fails_and_writes_nothing() {
        let store = store().await;
        let error = store
            .add_interaction("Ghost", "talked about pricing", None)
            .await
            .expect_err("customer missing");
        assert!(matches!(error, StoreError::NotFound(_)));

        store.upsert_customer(draft("Nouri", "555-0100")).await.expect("create");
        let detail = store.get_customer_detail("Nouri").await.expect("detail");
        assert!(detail.interactions.is_empty());
    }

    #[tokio::test]
    async fn interaction_stores_canonical_customer_name() {
        let store = store().await;
        store.upsert_customer(draft("Nouri", "555-0100")).await.expect("create");

        let interaction = store
            .add_interaction("  nouri ", "asked for a discount", None)
            .await
            .expect("log interaction");

        assert_eq!(interaction.customer_name, "Nouri");
    }

    #[tokio::test]
    async fn cascade_delete_counts_match_removed_rows() {
        let store = store().await;
        store.upsert_customer(draft("Nouri", "555-0100")).await.expect("create");
        store.add_interaction("Nouri", "first call", None).await.expect("interaction 1");
        store.add_interaction("Nouri", "second call", None).await.expect("interaction 2");
        store
            .add_reminder(ChatId(77), Some("Nouri"), "call back", Utc::now())
            .await
            .expect("reminder");

        // Unrelated rows must survive the cascade.
        store.upsert_customer(draft("Karimi", "555-0200")).await.expect("other customer");
        store.add_interaction("Karimi", "intro call", None).await.expect("other interaction");

        let summary = store.delete_customer("nouri", None).await.expect("delete");
        assert_eq!(summary.interactions_removed, 2);
        assert_eq!(summary.reminders_removed, 1);

        assert!(store.find_customer("Nouri", None).await.expect("find").is_none());
        let survivor = store.get_customer_detail("Karimi").await.expect("survivor detail");
        assert_eq!(survivor.interactions.len(), 1);
    }

    #[tokio::test]
    async fn delete_unknown_customer_is_not_found() {
        let store = store().await;
        let error = store.delete_customer("Ghost", None).await.expect_err("nothing to delete");
        assert!(matches!(error, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn query_customers_matches_substring_on_selected_field() {
        let store = store().await;
        store
            .upsert_customer(CustomerDraft {
                industry: Some("manufacturing".to_string()),
                ..draft("Nouri", "555-0100")
            })
            .await
            .expect("create 1");
        store
            .upsert_customer(CustomerDraft {
                industry: Some("retail".to_string()),
                ..draft("Karimi", "555-0200")
            })
            .await
            .expect("create 2");

        let hits = store
            .query_customers(&CustomerFilter {
                field: CustomerField::Industry,
                needle: "MANUF".to_string(),
            })
            .await
            .expect("query");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Nouri");
    }

    #[tokio::test]
    async fn detail_lists_interactions_most_recent_first() {
        let store = store().await;
        store.upsert_customer(draft("Nouri", "555-0100")).await.expect("create");
        store.add_interaction("Nouri", "first call", None).await.expect("interaction 1");
        store.add_interaction("Nouri", "second call", None).await.expect("interaction 2");

        let detail = store.get_customer_detail("Nouri").await.expect("detail");
        assert_eq!(detail.interactions.len(), 2);
        assert_eq!(detail.interactions[0].report, "second call");
        assert_eq!(detail.interactions[1].report, "first call");
    }

    #[tokio::test]
    async fn due_reminder_is_returned_until_marked_sent_and_never_after() {
        let store = store().await;
        let now = Utc::now();
        let due = store
            .add_reminder(ChatId(77), None, "follow up with Nouri", now - Duration::minutes(5))
            .await
            .expect("due reminder");
        store
            .add_reminder(ChatId(77), None, "future reminder", now + Duration::hours(1))
            .await
            .expect("future reminder");

        let first_pass = store.due_unsent_reminders(now).await.expect("first poll");
        assert_eq!(first_pass.len(), 1);
        assert_eq!(first_pass[0].id, due.id);

        store.mark_sent(due.id).await.expect("mark sent");

        let second_pass = store.due_unsent_reminders(now).await.expect("second poll");
        assert!(second_pass.is_empty());
    }

    #[tokio::test]
    async fn mark_sent_for_unknown_reminder_is_not_found() {
        let store = store().await;
        let error = store
            .mark_sent(rolodex_core::domain::reminder::ReminderId(999))
            .await
            .expect_err("no such reminder");
        assert!(matches!(error, StoreError::NotFound(_)));
    }
}
