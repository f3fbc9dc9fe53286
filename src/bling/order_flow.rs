// Order lifecycle: PENDING -> SENT | REJECTED | FAILED
//
// Approval chains contact resolution, payload construction and submission;
// the outcome is written back through a status compare-and-swap so two
// racing approvals collapse to a single winner. A failed attempt keeps the
// quote and records the cause; re-approving a FAILED quote re-resolves the
// contact and rebuilds the payload from scratch.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bling::contact::ContactResolver;
use crate::bling::database::{InsertOutcome, OrderDatabase, TransitionOutcome};
use crate::bling::errors::OrderError;
use crate::bling::order_payload::{build_sales_order, ensure_submittable};
use crate::bling::quote::{
    generate_order_number, QuoteInput, QuoteRecord, QuoteStatus, QuoteSummary,
};
use crate::bling::rest::BlingApi;

const MAX_ORDER_NUMBER_ATTEMPTS: usize = 100;

/// Result of a successful approval.
#[derive(Debug)]
pub struct ApprovalOutcome {
    pub quote: QuoteRecord,
    pub external_order_id: String,
}

pub struct OrderProcessor {
    db: OrderDatabase,
    api: Arc<dyn BlingApi>,
    resolver: ContactResolver,
    payment_method_id: Option<u64>,
}

impl OrderProcessor {
    pub fn new(db: OrderDatabase, api: Arc<dyn BlingApi>, payment_method_id: Option<u64>) -> Self {
        let resolver = ContactResolver::new(api.clone());
        Self {
            db,
            api,
            resolver,
            payment_method_id,
        }
    }

    /// Create a PENDING quote from validated input, allocating a unique
    /// order number (regenerated on collision).
    pub fn create_quote(&self, input: QuoteInput) -> Result<QuoteRecord, OrderError> {
        input.validate()?;
        let mut quote = QuoteRecord::from_input(input, generate_order_number());
        for _ in 0..MAX_ORDER_NUMBER_ATTEMPTS {
            match self.db.insert_quote(&quote).map_err(OrderError::storage)? {
                InsertOutcome::Inserted => {
                    info!(
                        quote_id = %quote.id,
                        order_number = %quote.order_number,
                        total_cents = quote.total_cents,
                        "Created quote"
                    );
                    return Ok(quote);
                }
                InsertOutcome::OrderNumberTaken => {
                    quote.order_number = generate_order_number();
                }
            }
        }
        Err(OrderError::Storage(
            "exhausted order number candidates".to_string(),
        ))
    }

    pub fn get(&self, id: &str) -> Result<QuoteRecord, OrderError> {
        self.db
            .get_quote(id)
            .map_err(OrderError::storage)?
            .ok_or(OrderError::NotFound)
    }

    /// Status inspection rows, newest first.
    pub fn list(&self) -> Result<Vec<QuoteSummary>, OrderError> {
        Ok(self
            .db
            .list_quotes()
            .map_err(OrderError::storage)?
            .iter()
            .map(QuoteRecord::summary)
            .collect())
    }

    /// Approve a quote: submit it to Bling and record the outcome.
    ///
    /// A quote already SENT is refused with `Conflict` before any external
    /// call, the idempotency guard against duplicate submission. On any
    /// failure in the resolve/build/submit chain the quote moves to FAILED
    /// with the cause recorded, and the error is surfaced to the caller.
    pub async fn approve(&self, id: &str) -> Result<ApprovalOutcome, OrderError> {
        let quote = self.get(id)?;
        if quote.status == QuoteStatus::Sent {
            return Err(OrderError::Conflict);
        }
        let observed = quote.status;

        match self.submit(&quote).await {
            Ok(external_order_id) => {
                let now = Utc::now();
                let stamped = external_order_id.clone();
                let outcome = self
                    .db
                    .transition_quote(id, observed, move |q| {
                        q.status = QuoteStatus::Sent;
                        q.external_order_id = Some(stamped);
                        q.last_error = None;
                        q.processed_at = Some(now);
                    })
                    .map_err(OrderError::storage)?;
                match outcome {
                    TransitionOutcome::Applied(updated) => {
                        info!(
                            quote_id = %id,
                            external_order_id = %external_order_id,
                            "Quote sent to Bling"
                        );
                        Ok(ApprovalOutcome {
                            quote: updated,
                            external_order_id,
                        })
                    }
                    TransitionOutcome::Missing => Err(OrderError::NotFound),
                    TransitionOutcome::StatusChanged(actual) => {
                        warn!(
                            quote_id = %id,
                            status = actual.as_str(),
                            "Concurrent transition won between submit and write-back"
                        );
                        Err(OrderError::Conflict)
                    }
                }
            }
            Err(err) => {
                let message = err.to_string();
                match self.db.transition_quote(id, observed, |q| {
                    q.status = QuoteStatus::Failed;
                    q.last_error = Some(message);
                }) {
                    Ok(TransitionOutcome::Applied(_)) => {
                        info!(quote_id = %id, error = %err, "Quote marked FAILED");
                    }
                    Ok(TransitionOutcome::StatusChanged(actual)) => {
                        warn!(
                            quote_id = %id,
                            status = actual.as_str(),
                            "Skipping FAILED write-back, status changed concurrently"
                        );
                    }
                    Ok(TransitionOutcome::Missing) => {
                        warn!(quote_id = %id, "Quote vanished before FAILED write-back");
                    }
                    Err(db_err) => {
                        warn!(quote_id = %id, error = %db_err, "Could not record failure");
                    }
                }
                Err(err)
            }
        }
    }

    /// Reject a quote. Guarded: a quote already SENT cannot be rejected.
    pub fn reject(&self, id: &str) -> Result<QuoteRecord, OrderError> {
        let quote = self.get(id)?;
        if quote.status == QuoteStatus::Sent {
            return Err(OrderError::Conflict);
        }
        let outcome = self
            .db
            .transition_quote(id, quote.status, |q| {
                q.status = QuoteStatus::Rejected;
            })
            .map_err(OrderError::storage)?;
        match outcome {
            TransitionOutcome::Applied(updated) => {
                info!(quote_id = %id, "Quote rejected");
                Ok(updated)
            }
            TransitionOutcome::Missing => Err(OrderError::NotFound),
            TransitionOutcome::StatusChanged(_) => Err(OrderError::Conflict),
        }
    }

    async fn submit(&self, quote: &QuoteRecord) -> Result<String, OrderError> {
        ensure_submittable(quote)?;
        let contact = self.resolver.resolve(quote).await?;
        let payload = build_sales_order(
            quote,
            contact,
            Utc::now().date_naive(),
            self.payment_method_id,
        )?;
        let created = self
            .api
            .create_sales_order(&payload)
            .await
            .map_err(OrderError::from)?;
        created
            .id
            .filter(|id| *id != 0)
            .map(|id| id.to_string())
            .ok_or_else(|| OrderError::IntegrationUnavailable {
                message: "sales order response carried no id".to_string(),
                status: None,
            })
    }
}
