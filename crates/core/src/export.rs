use chrono::NaiveDate;

use crate::domain::customer::Customer;

const HEADER: [&str; 6] = ["ID", "Name", "Phone", "Company", "Industry", "Services"];

/// Renders all customer rows as delimited text. Any field containing the
/// delimiter is sanitized (comma -> semicolon) so the row keeps the same
/// column count as the header.
pub fn customers_csv(customers: &[Customer]) -> String {
    let mut lines = Vec::with_capacity(customers.len() + 1);
    lines.push(HEADER.join(","));

    for customer in customers {
        let row = [
            customer.id.to_string(),
            sanitize_field(&customer.name),
            sanitize_field(&customer.phone),
            sanitize_field(customer.company.as_deref().unwrap_or("")),
            sanitize_field(customer.industry.as_deref().unwrap_or("")),
            sanitize_field(customer.services.as_deref().unwrap_or("")),
        ];
        lines.push(row.join(","));
    }

    lines.join("\n")
}

pub fn export_filename(today: NaiveDate) -> String {
    format!("CRM_Customers_Export_{}.csv", today.format("%Y-%m-%d"))
}

fn sanitize_field(value: &str) -> String {
    value.replace(',', ";")
}
