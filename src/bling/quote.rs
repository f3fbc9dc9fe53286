// Quote record schema and creation-time validation

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of a quote. Transitions are owned by the order flow;
/// `Approved` is reserved and never assigned by any transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Pending,
    Sent,
    Approved,
    Rejected,
    Failed,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Pending => "PENDING",
            QuoteStatus::Sent => "SENT",
            QuoteStatus::Approved => "APPROVED",
            QuoteStatus::Rejected => "REJECTED",
            QuoteStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteItem {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub product_name: String,
    pub quantity: u32,
    pub unit_cents: i64,
    pub subtotal_cents: i64,
}

/// Locally persisted quote. The client snapshot is captured at creation and
/// never rewritten; `total_cents` is computed once from the line subtotals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub id: String,
    pub order_number: String,
    pub client_name: String,
    pub client_email: String,
    pub client_company: String,
    pub client_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    pub status: QuoteStatus,
    pub items: Vec<QuoteItem>,
    pub total_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl QuoteRecord {
    /// Build a PENDING quote from validated input. Subtotals and the grand
    /// total are fixed here and never recomputed afterwards.
    pub fn from_input(input: QuoteInput, order_number: String) -> Self {
        let now = Utc::now();
        let items: Vec<QuoteItem> = input
            .items
            .into_iter()
            .map(|item| QuoteItem {
                id: Uuid::new_v4().to_string(),
                subtotal_cents: item.unit_cents * i64::from(item.quantity),
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_cents: item.unit_cents,
            })
            .collect();
        let total_cents = items.iter().map(|item| item.subtotal_cents).sum();

        Self {
            id: Uuid::new_v4().to_string(),
            order_number,
            client_name: input.client_name,
            client_email: input.client_email,
            client_company: input.client_company,
            client_phone: input.client_phone,
            client_document: input.client_document,
            observations: input.observations,
            status: QuoteStatus::Pending,
            items,
            total_cents,
            external_order_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    pub fn summary(&self) -> QuoteSummary {
        QuoteSummary {
            id: self.id.clone(),
            order_number: self.order_number.clone(),
            status: self.status,
            customer_name: self.client_name.clone(),
            total_cents: self.total_cents,
            items: self.items.clone(),
        }
    }
}

/// Client-facing row for status inspection.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteSummary {
    pub id: String,
    pub order_number: String,
    pub status: QuoteStatus,
    pub customer_name: String,
    pub total_cents: i64,
    pub items: Vec<QuoteItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteItemInput {
    #[serde(default)]
    pub product_id: Option<String>,
    pub product_name: String,
    pub quantity: u32,
    pub unit_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteInput {
    pub client_name: String,
    pub client_email: String,
    pub client_company: String,
    pub client_phone: String,
    #[serde(default)]
    pub client_document: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
    pub items: Vec<QuoteItemInput>,
}

impl QuoteInput {
    /// Validate the quote input
    pub fn validate(&self) -> Result<(), QuoteValidationError> {
        if self.client_name.trim().chars().count() < 3 {
            return Err(QuoteValidationError::NameTooShort);
        }
        if !is_plausible_email(&self.client_email) {
            return Err(QuoteValidationError::InvalidEmail);
        }
        if self.client_company.trim().chars().count() < 2 {
            return Err(QuoteValidationError::CompanyTooShort);
        }
        if self.client_phone.trim().chars().count() < 8 {
            return Err(QuoteValidationError::PhoneTooShort);
        }
        if self.items.is_empty() {
            return Err(QuoteValidationError::NoItems);
        }
        for (index, item) in self.items.iter().enumerate() {
            if item.product_name.trim().chars().count() < 2 {
                return Err(QuoteValidationError::ItemNameTooShort(index + 1));
            }
            if item.quantity == 0 {
                return Err(QuoteValidationError::InvalidQuantity(index + 1));
            }
            if item.unit_cents <= 0 {
                return Err(QuoteValidationError::InvalidUnitPrice(index + 1));
            }
        }
        Ok(())
    }
}

fn is_plausible_email(value: &str) -> bool {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[derive(Debug, Error)]
pub enum QuoteValidationError {
    #[error("client name must have at least 3 characters")]
    NameTooShort,

    #[error("client email is not a valid address")]
    InvalidEmail,

    #[error("client company must have at least 2 characters")]
    CompanyTooShort,

    #[error("client phone must have at least 8 characters")]
    PhoneTooShort,

    #[error("quote needs at least one item")]
    NoItems,

    #[error("item {0}: product name must have at least 2 characters")]
    ItemNameTooShort(usize),

    #[error("item {0}: quantity must be positive")]
    InvalidQuantity(usize),

    #[error("item {0}: unit price must be positive")]
    InvalidUnitPrice(usize),
}

/// Human-readable order number: date plus a random 3-digit suffix.
/// Uniqueness is enforced by the database index at insertion time; the
/// caller regenerates on collision.
pub fn generate_order_number() -> String {
    let date_part = Utc::now().format("%Y%m%d");
    let random_part: u32 = rand::thread_rng().gen_range(100..1000);
    format!("ORC-{date_part}-{random_part}")
}
