// End-to-end lifecycle tests: quote creation through approval/rejection
// against a stubbed Bling API.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bling_order_processor::bling::database::OrderDatabase;
use bling_order_processor::bling::errors::{BlingApiError, OrderError};
use bling_order_processor::bling::order_flow::OrderProcessor;
use bling_order_processor::bling::quote::{QuoteInput, QuoteItemInput, QuoteStatus};
use bling_order_processor::bling::rest::BlingApi;
use bling_order_processor::bling::types::{
    ContactQuery, ContactRef, NewContact, SalesOrder, SalesOrderRef,
};

#[derive(Default)]
struct StubApi {
    found_contact: Option<i64>,
    create_fails: bool,
    submit_fails: bool,
    external_order_id: Option<i64>,
    calls: AtomicUsize,
}

impl StubApi {
    fn happy_path() -> Self {
        Self {
            found_contact: Some(42),
            external_order_id: Some(999),
            ..Self::default()
        }
    }

    fn resolution_fails() -> Self {
        Self {
            create_fails: true,
            ..Self::default()
        }
    }

    fn submission_fails() -> Self {
        Self {
            found_contact: Some(42),
            submit_fails: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BlingApi for StubApi {
    async fn search_contacts(
        &self,
        _query: &ContactQuery,
    ) -> Result<Vec<ContactRef>, BlingApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .found_contact
            .map(|id| ContactRef {
                id: Some(id),
                nome: Some("ACME Ltda".to_string()),
            })
            .into_iter()
            .collect())
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<ContactRef, BlingApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.create_fails {
            return Err(BlingApiError::Api {
                status: 500,
                message: "contact create unavailable".to_string(),
            });
        }
        Ok(ContactRef {
            id: Some(77),
            nome: Some(contact.nome.clone()),
        })
    }

    async fn create_sales_order(&self, _order: &SalesOrder) -> Result<SalesOrderRef, BlingApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.submit_fails {
            return Err(BlingApiError::Api {
                status: 503,
                message: "order intake offline".to_string(),
            });
        }
        Ok(SalesOrderRef {
            id: self.external_order_id,
        })
    }
}

fn temp_db() -> (tempfile::TempDir, OrderDatabase) {
    let dir = tempfile::tempdir().unwrap();
    let db = OrderDatabase::new(dir.path().join("orders.redb")).unwrap();
    (dir, db)
}

fn processor(db: &OrderDatabase, api: Arc<StubApi>) -> OrderProcessor {
    OrderProcessor::new(db.clone(), api, None)
}

fn sample_input() -> QuoteInput {
    QuoteInput {
        client_name: "Maria Souza".to_string(),
        client_email: "maria@example.com".to_string(),
        client_company: "ACME Ltda".to_string(),
        client_phone: "11999990000".to_string(),
        client_document: Some("12.345.678/0001-95".to_string()),
        observations: None,
        items: vec![
            QuoteItemInput {
                product_id: Some("SKU-1".to_string()),
                product_name: "Parafuso M6".to_string(),
                quantity: 3,
                unit_cents: 1000,
            },
            QuoteItemInput {
                product_id: None,
                product_name: "Arruela".to_string(),
                quantity: 1,
                unit_cents: 2500,
            },
        ],
    }
}

#[tokio::test]
async fn approval_sends_quote_and_records_external_id() {
    let (_dir, db) = temp_db();
    let api = Arc::new(StubApi::happy_path());
    let orders = processor(&db, api);

    let quote = orders.create_quote(sample_input()).unwrap();
    assert_eq!(quote.total_cents, 5500);
    assert_eq!(quote.status, QuoteStatus::Pending);

    let outcome = orders.approve(&quote.id).await.unwrap();
    assert_eq!(outcome.external_order_id, "999");
    assert_eq!(outcome.quote.status, QuoteStatus::Sent);

    // Outcome is durable, and the totals were not recomputed.
    let stored = db.get_quote(&quote.id).unwrap().unwrap();
    assert_eq!(stored.status, QuoteStatus::Sent);
    assert_eq!(stored.external_order_id.as_deref(), Some("999"));
    assert!(stored.processed_at.is_some());
    assert!(stored.last_error.is_none());
    assert_eq!(stored.total_cents, 5500);
}

#[tokio::test]
async fn failed_resolution_marks_quote_failed_and_keeps_data() {
    let (_dir, db) = temp_db();
    let orders = processor(&db, Arc::new(StubApi::resolution_fails()));

    let quote = orders.create_quote(sample_input()).unwrap();
    let err = orders.approve(&quote.id).await.unwrap_err();
    assert!(matches!(err, OrderError::ContactResolutionFailed(_)));

    let stored = db.get_quote(&quote.id).unwrap().unwrap();
    assert_eq!(stored.status, QuoteStatus::Failed);
    assert!(stored
        .last_error
        .as_deref()
        .is_some_and(|msg| !msg.is_empty()));
    assert!(stored.external_order_id.is_none());

    // The attempt is recorded but the original quote data is untouched.
    assert_eq!(stored.total_cents, 5500);
    assert_eq!(stored.items.len(), 2);
    assert_eq!(stored.client_name, "Maria Souza");
    assert_eq!(stored.order_number, quote.order_number);
}

#[tokio::test]
async fn failed_submission_after_resolved_contact_marks_quote_failed() {
    let (_dir, db) = temp_db();
    let orders = processor(&db, Arc::new(StubApi::submission_fails()));

    let quote = orders.create_quote(sample_input()).unwrap();
    let err = orders.approve(&quote.id).await.unwrap_err();
    match err {
        OrderError::IntegrationUnavailable { status, .. } => assert_eq!(status, Some(503)),
        other => panic!("unexpected error: {other:?}"),
    }

    let stored = db.get_quote(&quote.id).unwrap().unwrap();
    assert_eq!(stored.status, QuoteStatus::Failed);
    assert!(stored
        .last_error
        .as_deref()
        .is_some_and(|msg| msg.contains("order intake offline")));
    assert_eq!(stored.total_cents, 5500);
}

#[tokio::test]
async fn approving_sent_quote_conflicts_without_external_calls() {
    let (_dir, db) = temp_db();
    let api = Arc::new(StubApi::happy_path());
    let orders = processor(&db, api.clone());

    let quote = orders.create_quote(sample_input()).unwrap();
    orders.approve(&quote.id).await.unwrap();
    let calls_after_first = api.calls.load(Ordering::SeqCst);

    let err = orders.approve(&quote.id).await.unwrap_err();
    assert!(matches!(err, OrderError::Conflict));
    assert_eq!(api.calls.load(Ordering::SeqCst), calls_after_first);
}

#[tokio::test]
async fn reapproval_after_failure_retries_from_scratch() {
    let (_dir, db) = temp_db();
    let failing = processor(&db, Arc::new(StubApi::resolution_fails()));

    let quote = failing.create_quote(sample_input()).unwrap();
    failing.approve(&quote.id).await.unwrap_err();
    assert_eq!(
        db.get_quote(&quote.id).unwrap().unwrap().status,
        QuoteStatus::Failed
    );

    // Manual re-approval re-resolves the contact and rebuilds the payload.
    let recovered = processor(&db, Arc::new(StubApi::happy_path()));
    let outcome = recovered.approve(&quote.id).await.unwrap();
    assert_eq!(outcome.quote.status, QuoteStatus::Sent);
    assert_eq!(outcome.external_order_id, "999");
    assert!(outcome.quote.last_error.is_none());
}

#[tokio::test]
async fn reject_is_terminal_for_pending_and_failed_quotes() {
    let (_dir, db) = temp_db();
    let orders = processor(&db, Arc::new(StubApi::happy_path()));

    let quote = orders.create_quote(sample_input()).unwrap();
    let rejected = orders.reject(&quote.id).unwrap();
    assert_eq!(rejected.status, QuoteStatus::Rejected);
}

#[tokio::test]
async fn rejecting_sent_quote_conflicts() {
    let (_dir, db) = temp_db();
    let orders = processor(&db, Arc::new(StubApi::happy_path()));

    let quote = orders.create_quote(sample_input()).unwrap();
    orders.approve(&quote.id).await.unwrap();

    let err = orders.reject(&quote.id).unwrap_err();
    assert!(matches!(err, OrderError::Conflict));
    assert_eq!(
        db.get_quote(&quote.id).unwrap().unwrap().status,
        QuoteStatus::Sent
    );
}

#[tokio::test]
async fn unknown_quote_is_not_found() {
    let (_dir, db) = temp_db();
    let orders = processor(&db, Arc::new(StubApi::happy_path()));

    let err = orders.approve("missing").await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound));
    let err = orders.reject("missing").unwrap_err();
    assert!(matches!(err, OrderError::NotFound));
}

#[tokio::test]
async fn listing_exposes_client_facing_summaries() {
    let (_dir, db) = temp_db();
    let orders = processor(&db, Arc::new(StubApi::happy_path()));

    let quote = orders.create_quote(sample_input()).unwrap();
    let summaries = orders.list().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, quote.id);
    assert_eq!(summaries[0].customer_name, "Maria Souza");
    assert_eq!(summaries[0].total_cents, 5500);
    assert_eq!(summaries[0].items.len(), 2);
    assert_eq!(summaries[0].status, QuoteStatus::Pending);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_storage() {
    let (_dir, db) = temp_db();
    let orders = processor(&db, Arc::new(StubApi::happy_path()));

    let mut input = sample_input();
    input.items.clear();
    let err = orders.create_quote(input).unwrap_err();
    assert!(matches!(err, OrderError::InvalidInput(_)));
    assert!(orders.list().unwrap().is_empty());
}
