use serde::{Deserialize, Serialize};

use super::interaction::Interaction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub i64);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A customer row. `name` is the case-insensitive match key; `phone` is
/// the secondary key and unique per store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub phone: String,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub services: Option<String>,
}

impl Customer {
    /// Absorbs the draft's optional fields, overwriting an existing value
    /// only when the incoming value is non-empty and differs. Returns
    /// whether anything changed.
    pub fn absorb(&mut self, draft: &CustomerDraft) -> bool {
        let mut changed = false;
        changed |= absorb_field(&mut self.company, draft.company.as_deref());
        changed |= absorb_field(&mut self.industry, draft.industry.as_deref());
        changed |= absorb_field(&mut self.services, draft.services.as_deref());
        changed
    }

    pub fn field_value(&self, field: CustomerField) -> &str {
        match field {
            CustomerField::Name => &self.name,
            CustomerField::Phone => &self.phone,
            CustomerField::Company => self.company.as_deref().unwrap_or(""),
            CustomerField::Industry => self.industry.as_deref().unwrap_or(""),
            CustomerField::Services => self.services.as_deref().unwrap_or(""),
        }
    }
}

fn absorb_field(current: &mut Option<String>, incoming: Option<&str>) -> bool {
    let Some(incoming) = incoming else {
        return false;
    };
    let incoming = incoming.trim();
    if incoming.is_empty() || current.as_deref() == Some(incoming) {
        return false;
    }
    *current = Some(incoming.to_string());
    true
}

/// Caller-supplied customer fields for an upsert. `name` and `phone` are
/// required; the store rejects blank values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerDraft {
    pub name: String,
    pub phone: String,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub services: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CustomerUpsert {
    Created(Customer),
    Updated(Customer),
    Unchanged(Customer),
}

impl CustomerUpsert {
    pub fn customer(&self) -> &Customer {
        match self {
            Self::Created(customer) | Self::Updated(customer) | Self::Unchanged(customer) => {
                customer
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CustomerField {
    Name,
    Phone,
    Company,
    Industry,
    Services,
}

impl CustomerField {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "phone" => Some(Self::Phone),
            "company" => Some(Self::Company),
            "industry" => Some(Self::Industry),
            "services" => Some(Self::Services),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Phone => "Phone",
            Self::Company => "Company",
            Self::Industry => "Industry",
            Self::Services => "Services",
        }
    }
}

/// Substring filter over a single customer field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomerFilter {
    pub field: CustomerField,
    pub needle: String,
}

impl CustomerFilter {
    pub fn matches(&self, customer: &Customer) -> bool {
        customer
            .field_value(self.field)
            .to_lowercase()
            .contains(&self.needle.trim().to_lowercase())
    }
}

/// Counts of dependent rows removed by a cascading customer delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub interactions_removed: u64,
    pub reminders_removed: u64,
}

/// A customer together with its interaction history, most recent first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomerDetail {
    pub customer: Customer,
    pub interactions: Vec<Interaction>,
}

#[cfg(test)]
mod tests {
    use super::{Customer, CustomerDraft, CustomerField, CustomerFilter, CustomerId};

    fn customer_fixture() -> Customer {
        Customer {
            id: CustomerId(7),
            name: "Nouri".to_string(),
            phone: "555-0100".to_string(),
            company: Some("Arman Steel".to_string()),
            industry: Some("manufacturing".to_string()),
            services: None,
        }
    }

    #[test]
    fn absorb_overwrites_only_changed_fields() {
        let mut customer = customer_fixture();
        let changed = customer.absorb(&CustomerDraft {
            name: customer.name.clone(),
            phone: customer.phone.clone(),
            company: Some("Arman Steel".to_string()),
            industry: Some("metals".to_string()),
            services: None,
        });

        assert!(changed);
        assert_eq!(customer.company.as_deref(), Some("Arman Steel"));
        assert_eq!(customer.industry.as_deref(), Some("metals"));
        assert_eq!(customer.services, None);
    }

    #[test]
    fn absorb_reports_unchanged_when_values_match() {
        let mut customer = customer_fixture();
        let changed = customer.absorb(&CustomerDraft {
            name: customer.name.clone(),
            phone: customer.phone.clone(),
            company: Some("Arman Steel".to_string()),
            industry: None,
            services: Some("   ".to_string()),
        });

        assert!(!changed);
    }

    #[test]
    fn filter_matches_substring_case_insensitively() {
        let customer = customer_fixture();
        let filter =
            CustomerFilter { field: CustomerField::Industry, needle: "MANUF".to_string() };
        assert!(filter.matches(&customer));

        let miss = CustomerFilter { field: CustomerField::Services, needle: "web".to_string() };
        assert!(!miss.matches(&customer));
    }

    #[test]
    fn field_parse_accepts_known_names_only() {
        assert_eq!(CustomerField::parse(" Industry "), Some(CustomerField::Industry));
        assert_eq!(CustomerField::parse("budget"), None);
    }
}
