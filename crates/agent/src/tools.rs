use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use rolodex_core::domain::customer::{
    Customer, CustomerDraft, CustomerField, CustomerFilter, CustomerUpsert,
};
use rolodex_core::domain::reminder::parse_due_at;
use rolodex_core::domain::ChatId;
use rolodex_db::store::{CrmStore, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
}

impl ParamKind {
    fn schema_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

/// Declared shape of a tool: what the model sees when deciding whether and
/// how to call it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    /// JSON-schema rendering of the parameter list, in declaration order.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            properties.insert(
                param.name.to_string(),
                json!({ "type": param.kind.schema_type(), "description": param.description }),
            );
            if param.required {
                required.push(Value::String(param.name.to_string()));
            }
        }

        json!({ "type": "object", "properties": properties, "required": required })
    }
}

/// Human-readable result of one tool execution. Failures are data, not
/// errors: the model narrates them back to the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutcome {
    pub ok: bool,
    pub message: String,
}

impl ToolOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self { ok: true, message: message.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into() }
    }
}

/// Caller-scoped context for implicit arguments the model may omit.
#[derive(Clone, Copy, Debug)]
pub struct ToolContext {
    pub chat_id: ChatId,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> ToolOutcome;
}

/// The single place tools are added. The orchestration loop only ever
/// resolves handlers here by name; it never touches the store directly.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.push(Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|tool| tool.spec().name == name).map(|tool| &**tool)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registers the full CRM tool set over the given store.
    pub fn builtin(store: Arc<dyn CrmStore>) -> Self {
        let mut registry = Self::default();
        registry.register(ManageCustomerTool { store: store.clone() });
        registry.register(LogInteractionTool { store: store.clone() });
        registry.register(SetReminderTool { store: store.clone() });
        registry.register(GetReportTool { store: store.clone() });
        registry.register(DeleteCustomerTool { store });
        registry
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolOutcome> {
    match args.get(key).and_then(Value::as_str).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ToolOutcome::failure(format!("missing required argument `{key}`"))),
    }
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
}

fn storage_outcome(error: StoreError) -> ToolOutcome {
    match error {
        StoreError::Validation(message) => ToolOutcome::failure(message),
        StoreError::NotFound(message) => ToolOutcome::failure(format!("{message} was not found")),
        StoreError::Conflict(message) => ToolOutcome::failure(format!(
            "cannot complete the operation: {message}. Use the existing customer or supply a different phone number."
        )),
        StoreError::Database(_) | StoreError::Decode(_) => ToolOutcome::failure(
            "the customer store is temporarily unavailable; please try again shortly",
        ),
    }
}

fn parse_optional_date(args: &Value, key: &str) -> Result<Option<NaiveDate>, ToolOutcome> {
    let Some(raw) = optional_str(args, key) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(Some).map_err(|_| {
        ToolOutcome::failure(format!("could not parse `{key}` value `{raw}` (expected YYYY-MM-DD)"))
    })
}

struct ManageCustomerTool {
    store: Arc<dyn CrmStore>,
}

#[async_trait]
impl Tool for ManageCustomerTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "manage_customer",
            description: "Register a new customer or update an existing one. Name and phone are required; company, industry and services are optional and only overwrite stored values when they differ.",
            params: vec![
                ParamSpec { name: "name", kind: ParamKind::String, required: true, description: "Customer name" },
                ParamSpec { name: "phone", kind: ParamKind::String, required: true, description: "Customer phone number" },
                ParamSpec { name: "company", kind: ParamKind::String, required: false, description: "Company the customer works for" },
                ParamSpec { name: "industry", kind: ParamKind::String, required: false, description: "Customer's industry" },
                ParamSpec { name: "services", kind: ParamKind::String, required: false, description: "Services the customer is interested in" },
            ],
        }
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let name = match required_str(args, "name") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };
        let phone = match required_str(args, "phone") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };

        let draft = CustomerDraft {
            name: name.to_string(),
            phone: phone.to_string(),
            company: optional_str(args, "company").map(str::to_string),
            industry: optional_str(args, "industry").map(str::to_string),
            services: optional_str(args, "services").map(str::to_string),
        };

        match self.store.upsert_customer(draft).await {
            Ok(CustomerUpsert::Created(customer)) => ToolOutcome::success(format!(
                "Registered customer `{}` (id {}).",
                customer.name, customer.id
            )),
            Ok(CustomerUpsert::Updated(customer)) => ToolOutcome::success(format!(
                "Updated customer `{}` (id {}).",
                customer.name, customer.id
            )),
            Ok(CustomerUpsert::Unchanged(customer)) => ToolOutcome::success(format!(
                "Customer `{}` (id {}) was already registered; no update needed.",
                customer.name, customer.id
            )),
            Err(error) => storage_outcome(error),
        }
    }
}

struct LogInteractionTool {
    store: Arc<dyn CrmStore>,
}

#[async_trait]
impl Tool for LogInteractionTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "log_interaction",
            description: "Log a call or meeting report for an already-registered customer. The interaction is dated today; an optional follow-up date can be attached.",
            params: vec![
                ParamSpec { name: "customer_name", kind: ParamKind::String, required: true, description: "Name of the registered customer" },
                ParamSpec { name: "report", kind: ParamKind::String, required: true, description: "Free-text summary of the interaction" },
                ParamSpec { name: "follow_up_date", kind: ParamKind::String, required: false, description: "Follow-up date as YYYY-MM-DD" },
            ],
        }
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let customer_name = match required_str(args, "customer_name") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };
        let report = match required_str(args, "report") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };
        let follow_up_date = match parse_optional_date(args, "follow_up_date") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };

        match self.store.add_interaction(customer_name, report, follow_up_date).await {
            Ok(interaction) => {
                let follow_up_note = interaction
                    .follow_up_date
                    .map(|date| format!(" Follow-up scheduled for {date}."))
                    .unwrap_or_default();
                ToolOutcome::success(format!(
                    "Logged interaction {} with `{}` on {}.{}",
                    interaction.id, interaction.customer_name, interaction.date, follow_up_note
                ))
            }
            Err(StoreError::NotFound(_)) => ToolOutcome::failure(format!(
                "customer `{customer_name}` is not registered; register them before logging interactions"
            )),
            Err(error) => storage_outcome(error),
        }
    }
}

struct SetReminderTool {
    store: Arc<dyn CrmStore>,
}

#[async_trait]
impl Tool for SetReminderTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "set_reminder",
            description: "Schedule a reminder to be delivered to this chat at a given time. The customer name is free text and does not need to be registered.",
            params: vec![
                ParamSpec { name: "text", kind: ParamKind::String, required: true, description: "Reminder message" },
                ParamSpec { name: "due_at", kind: ParamKind::String, required: true, description: "Due time as `YYYY-MM-DD HH:MM` (UTC) or RFC 3339" },
                ParamSpec { name: "customer_name", kind: ParamKind::String, required: false, description: "Customer the reminder is about" },
                ParamSpec { name: "chat_id", kind: ParamKind::Integer, required: false, description: "Target chat; defaults to the active chat" },
            ],
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> ToolOutcome {
        let text = match required_str(args, "text") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };
        let due_raw = match required_str(args, "due_at") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };
        let Some(due_at) = parse_due_at(due_raw) else {
            return ToolOutcome::failure(format!(
                "could not parse due time `{due_raw}` (expected `YYYY-MM-DD HH:MM` or RFC 3339)"
            ));
        };

        // The model is told to target the active chat, but the session id
        // is injected here whenever it omits the argument.
        let chat_id = args
            .get("chat_id")
            .and_then(Value::as_i64)
            .map(ChatId)
            .unwrap_or(ctx.chat_id);

        let customer_name = optional_str(args, "customer_name");
        match self.store.add_reminder(chat_id, customer_name, text, due_at).await {
            Ok(reminder) => ToolOutcome::success(format!(
                "Reminder {} set for {} (UTC).",
                reminder.id,
                reminder.due_at.format("%Y-%m-%d %H:%M")
            )),
            Err(error) => storage_outcome(error),
        }
    }
}

struct GetReportTool {
    store: Arc<dyn CrmStore>,
}

const DEFAULT_REPORT_FIELDS: [CustomerField; 4] =
    [CustomerField::Name, CustomerField::Phone, CustomerField::Company, CustomerField::Industry];

#[async_trait]
impl Tool for GetReportTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_report",
            description: "Query customer data. `industry_search` lists customers whose industry contains the search term, projected onto the requested fields; `full_customer` returns one customer with their interaction history.",
            params: vec![
                ParamSpec { name: "query_type", kind: ParamKind::String, required: true, description: "One of `industry_search` or `full_customer`" },
                ParamSpec { name: "search_term", kind: ParamKind::String, required: true, description: "Industry substring or customer name" },
                ParamSpec { name: "fields", kind: ParamKind::String, required: false, description: "Comma-separated fields to return (name, phone, company, industry, services); defaults to name, phone, company, industry" },
            ],
        }
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let query_type = match required_str(args, "query_type") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };
        let search_term = match required_str(args, "search_term") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };

        match query_type {
            "industry_search" => self.industry_search(search_term, args).await,
            "full_customer" => self.full_customer(search_term).await,
            other => ToolOutcome::failure(format!(
                "unsupported query type `{other}` (expected `industry_search` or `full_customer`)"
            )),
        }
    }
}

impl GetReportTool {
    async fn industry_search(&self, search_term: &str, args: &Value) -> ToolOutcome {
        let fields = match report_fields(args) {
            Ok(fields) => fields,
            Err(outcome) => return outcome,
        };

        let filter =
            CustomerFilter { field: CustomerField::Industry, needle: search_term.to_string() };
        let customers = match self.store.query_customers(&filter).await {
            Ok(customers) => customers,
            Err(error) => return storage_outcome(error),
        };

        if customers.is_empty() {
            return ToolOutcome::success(format!("No customers found in `{search_term}`."));
        }

        let header = fields.iter().map(|field| field.label()).collect::<Vec<_>>().join(" | ");
        let mut lines = vec![
            format!("Customers in `{search_term}` ({} match(es)):", customers.len()),
            header,
            "-".repeat(50),
        ];
        for customer in &customers {
            lines.push(project_row(customer, &fields));
        }

        ToolOutcome::success(lines.join("\n"))
    }

    async fn full_customer(&self, name: &str) -> ToolOutcome {
        let detail = match self.store.get_customer_detail(name).await {
            Ok(detail) => detail,
            Err(StoreError::NotFound(_)) => {
                return ToolOutcome::failure(format!("customer `{name}` was not found"))
            }
            Err(error) => return storage_outcome(error),
        };

        let customer = &detail.customer;
        let mut lines = vec![
            format!("Customer `{}` (id {}):", customer.name, customer.id),
            format!("  Phone: {}", customer.phone),
            format!("  Company: {}", customer.company.as_deref().unwrap_or("-")),
            format!("  Industry: {}", customer.industry.as_deref().unwrap_or("-")),
            format!("  Services: {}", customer.services.as_deref().unwrap_or("-")),
        ];

        if detail.interactions.is_empty() {
            lines.push("No interactions logged yet.".to_string());
        } else {
            lines.push("Interaction history (most recent first):".to_string());
            for interaction in &detail.interactions {
                let follow_up = interaction
                    .follow_up_date
                    .map(|date| format!(", follow-up {date}"))
                    .unwrap_or_default();
                lines.push(format!(
                    "  - {}{}: {}",
                    interaction.date, follow_up, interaction.report
                ));
            }
        }

        ToolOutcome::success(lines.join("\n"))
    }
}

fn report_fields(args: &Value) -> Result<Vec<CustomerField>, ToolOutcome> {
    let Some(raw) = optional_str(args, "fields") else {
        return Ok(DEFAULT_REPORT_FIELDS.to_vec());
    };
    if raw.eq_ignore_ascii_case("all") {
        return Ok(vec![
            CustomerField::Name,
            CustomerField::Phone,
            CustomerField::Company,
            CustomerField::Industry,
            CustomerField::Services,
        ]);
    }

    let mut fields = Vec::new();
    for token in raw.split(',') {
        let Some(field) = CustomerField::parse(token) else {
            return Err(ToolOutcome::failure(format!(
                "unknown report field `{}` (expected name, phone, company, industry or services)",
                token.trim()
            )));
        };
        fields.push(field);
    }
    Ok(fields)
}

fn project_row(customer: &Customer, fields: &[CustomerField]) -> String {
    fields
        .iter()
        .map(|field| {
            let value = customer.field_value(*field);
            if value.is_empty() { "-".to_string() } else { value.to_string() }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

struct DeleteCustomerTool {
    store: Arc<dyn CrmStore>,
}

#[async_trait]
impl Tool for DeleteCustomerTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "delete_customer",
            description: "Delete a customer and cascade to every interaction and reminder referencing their name. Irreversible; only call when the operator explicitly asks for deletion.",
            params: vec![
                ParamSpec { name: "name", kind: ParamKind::String, required: true, description: "Customer name" },
                ParamSpec { name: "phone", kind: ParamKind::String, required: false, description: "Phone number, to disambiguate customers sharing a name" },
            ],
        }
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let name = match required_str(args, "name") {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };
        let phone = optional_str(args, "phone");

        match self.store.delete_customer(name, phone).await {
            Ok(summary) => ToolOutcome::success(format!(
                "Deleted customer `{name}` along with {} interaction(s) and {} reminder(s).",
                summary.interactions_removed, summary.reminders_removed
            )),
            Err(StoreError::NotFound(_)) => {
                ToolOutcome::failure(format!("customer `{name}` was not found"))
            }
            Err(error) => storage_outcome(error),
        }
    }
}
