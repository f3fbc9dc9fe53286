//! Database module for quotes, the Bling token singleton and OAuth states
//!
//! Uses redb; every mutation runs inside a single write transaction, which
//! is what makes the status compare-and-swap in [`transition_quote`] atomic.
//!
//! [`transition_quote`]: OrderDatabase::transition_quote

use anyhow::Result;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

use crate::bling::quote::{QuoteRecord, QuoteStatus};
use crate::bling::token::StoredToken;

/// Quote records. Key: quote id. Value: serialized QuoteRecord JSON.
const QUOTES: TableDefinition<&str, &[u8]> = TableDefinition::new("quotes");

/// Uniqueness index for human-readable order numbers. Key: order number.
/// Value: owning quote id.
const ORDER_NUMBERS: TableDefinition<&str, &str> = TableDefinition::new("order_numbers");

/// Singleton Bling token record under [`TOKEN_KEY`].
const BLING_TOKEN: TableDefinition<&str, &[u8]> = TableDefinition::new("bling_token");

/// OAuth anti-CSRF states. Key: state nonce. Value: serialized issue time.
const OAUTH_STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("oauth_states");

const TOKEN_KEY: &str = "current";

/// Outcome of a quote insertion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    OrderNumberTaken,
}

/// Outcome of a guarded status transition.
#[derive(Debug)]
pub enum TransitionOutcome {
    Applied(QuoteRecord),
    Missing,
    /// The status no longer matches what the caller observed; carries the
    /// status actually found.
    StatusChanged(QuoteStatus),
}

/// Database wrapper for the order core
#[derive(Clone)]
pub struct OrderDatabase {
    db: Arc<Database>,
}

impl OrderDatabase {
    /// Create a new database instance or open an existing one
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        // Create tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _table = write_txn.open_table(QUOTES)?;
            let _table = write_txn.open_table(ORDER_NUMBERS)?;
            let _table = write_txn.open_table(BLING_TOKEN)?;
            let _table = write_txn.open_table(OAUTH_STATES)?;
        }
        write_txn.commit()?;

        tracing::info!("Database initialized with quote, token and oauth tables");

        Ok(Self { db: Arc::new(db) })
    }

    /// Insert a quote, claiming its order number in the same transaction.
    pub fn insert_quote(&self, quote: &QuoteRecord) -> Result<InsertOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut numbers = write_txn.open_table(ORDER_NUMBERS)?;
            if numbers.get(quote.order_number.as_str())?.is_some() {
                InsertOutcome::OrderNumberTaken
            } else {
                numbers.insert(quote.order_number.as_str(), quote.id.as_str())?;
                let mut quotes = write_txn.open_table(QUOTES)?;
                let value = serde_json::to_vec(quote)?;
                quotes.insert(quote.id.as_str(), value.as_slice())?;
                InsertOutcome::Inserted
            }
        };
        write_txn.commit()?;
        if outcome == InsertOutcome::Inserted {
            tracing::debug!(
                quote_id = %quote.id,
                order_number = %quote.order_number,
                "Inserted quote"
            );
        }
        Ok(outcome)
    }

    /// Get a quote by id
    pub fn get_quote(&self, id: &str) -> Result<Option<QuoteRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(QUOTES)?;

        let result = table.get(id)?;
        match result {
            Some(curr) => {
                let quote: QuoteRecord = serde_json::from_slice(curr.value())?;
                Ok(Some(quote))
            }
            None => Ok(None),
        }
    }

    /// List all quotes, newest first.
    pub fn list_quotes(&self) -> Result<Vec<QuoteRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(QUOTES)?;

        let mut quotes = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            quotes.push(serde_json::from_slice::<QuoteRecord>(value.value())?);
        }
        quotes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quotes)
    }

    /// Compare-and-swap status transition: `apply` runs only while the
    /// stored status still equals `expected`, all inside one write
    /// transaction. Concurrent approvals collapse to a single winner.
    pub fn transition_quote(
        &self,
        id: &str,
        expected: QuoteStatus,
        apply: impl FnOnce(&mut QuoteRecord),
    ) -> Result<TransitionOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(QUOTES)?;
            let current = match table.get(id)? {
                Some(guard) => Some(serde_json::from_slice::<QuoteRecord>(guard.value())?),
                None => None,
            };
            match current {
                None => TransitionOutcome::Missing,
                Some(quote) if quote.status != expected => {
                    TransitionOutcome::StatusChanged(quote.status)
                }
                Some(mut quote) => {
                    apply(&mut quote);
                    quote.updated_at = Utc::now();
                    let value = serde_json::to_vec(&quote)?;
                    table.insert(id, value.as_slice())?;
                    TransitionOutcome::Applied(quote)
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Get the singleton Bling token, if one was ever stored
    pub fn get_token(&self) -> Result<Option<StoredToken>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BLING_TOKEN)?;

        let result = table.get(TOKEN_KEY)?;
        match result {
            Some(curr) => {
                let token: StoredToken = serde_json::from_slice(curr.value())?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    /// Upsert the singleton Bling token, replacing any previous record
    pub fn put_token(&self, token: &StoredToken) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BLING_TOKEN)?;
            let value = serde_json::to_vec(token)?;
            table.insert(TOKEN_KEY, value.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!("Stored Bling token record");
        Ok(())
    }

    /// Store an issued OAuth state with its issue time
    pub fn insert_oauth_state(&self, state: &str, created_at: DateTime<Utc>) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OAUTH_STATES)?;
            let value = serde_json::to_vec(&created_at)?;
            table.insert(state, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove an OAuth state unconditionally, returning its issue time if it
    /// existed. Single use is enforced here; freshness is the guard's call.
    pub fn take_oauth_state(&self, state: &str) -> Result<Option<DateTime<Utc>>> {
        let write_txn = self.db.begin_write()?;
        let created_at = {
            let mut table = write_txn.open_table(OAUTH_STATES)?;
            let created_at = match table.remove(state)? {
                Some(guard) => Some(serde_json::from_slice::<DateTime<Utc>>(guard.value())?),
                None => None,
            };
            created_at
        };
        write_txn.commit()?;
        Ok(created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bling::quote::{QuoteInput, QuoteItemInput};

    fn temp_db() -> (tempfile::TempDir, OrderDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let db = OrderDatabase::new(dir.path().join("orders.redb")).unwrap();
        (dir, db)
    }

    fn sample_quote(order_number: &str) -> QuoteRecord {
        let input = QuoteInput {
            client_name: "Maria Souza".to_string(),
            client_email: "maria@example.com".to_string(),
            client_company: "ACME Ltda".to_string(),
            client_phone: "11999990000".to_string(),
            client_document: None,
            observations: None,
            items: vec![QuoteItemInput {
                product_id: None,
                product_name: "Parafuso M6".to_string(),
                quantity: 2,
                unit_cents: 500,
            }],
        };
        QuoteRecord::from_input(input, order_number.to_string())
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let (_dir, db) = temp_db();
        let quote = sample_quote("ORC-20260806-111");
        assert_eq!(db.insert_quote(&quote).unwrap(), InsertOutcome::Inserted);

        let loaded = db.get_quote(&quote.id).unwrap().unwrap();
        assert_eq!(loaded.order_number, "ORC-20260806-111");
        assert_eq!(loaded.total_cents, 1000);
        assert_eq!(loaded.status, QuoteStatus::Pending);
    }

    #[test]
    fn duplicate_order_number_is_reported() {
        let (_dir, db) = temp_db();
        let first = sample_quote("ORC-20260806-222");
        let second = sample_quote("ORC-20260806-222");
        assert_eq!(db.insert_quote(&first).unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            db.insert_quote(&second).unwrap(),
            InsertOutcome::OrderNumberTaken
        );
        // The losing quote was not stored.
        assert!(db.get_quote(&second.id).unwrap().is_none());
    }

    #[test]
    fn transition_applies_only_on_expected_status() {
        let (_dir, db) = temp_db();
        let quote = sample_quote("ORC-20260806-333");
        db.insert_quote(&quote).unwrap();

        let outcome = db
            .transition_quote(&quote.id, QuoteStatus::Pending, |q| {
                q.status = QuoteStatus::Sent;
                q.external_order_id = Some("999".to_string());
            })
            .unwrap();
        match outcome {
            TransitionOutcome::Applied(updated) => {
                assert_eq!(updated.status, QuoteStatus::Sent);
                assert_eq!(updated.external_order_id.as_deref(), Some("999"));
                assert!(updated.updated_at >= quote.updated_at);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Second CAS still expecting PENDING loses.
        let outcome = db
            .transition_quote(&quote.id, QuoteStatus::Pending, |q| {
                q.status = QuoteStatus::Failed;
            })
            .unwrap();
        assert!(matches!(
            outcome,
            TransitionOutcome::StatusChanged(QuoteStatus::Sent)
        ));

        // Stored record untouched by the losing transition.
        let loaded = db.get_quote(&quote.id).unwrap().unwrap();
        assert_eq!(loaded.status, QuoteStatus::Sent);
    }

    #[test]
    fn transition_of_unknown_quote_is_missing() {
        let (_dir, db) = temp_db();
        let outcome = db
            .transition_quote("nope", QuoteStatus::Pending, |_| {})
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::Missing));
    }

    #[test]
    fn token_upsert_replaces_singleton() {
        let (_dir, db) = temp_db();
        assert!(db.get_token().unwrap().is_none());

        let first = StoredToken {
            access_token: "at-1".to_string(),
            refresh_token: "rt-1".to_string(),
            expires_at: Utc::now(),
            token_type: Some("Bearer".to_string()),
            scope: None,
            created_at: Utc::now(),
        };
        db.put_token(&first).unwrap();
        let mut second = first.clone();
        second.access_token = "at-2".to_string();
        db.put_token(&second).unwrap();

        let loaded = db.get_token().unwrap().unwrap();
        assert_eq!(loaded.access_token, "at-2");
        assert_eq!(loaded.refresh_token, "rt-1");
    }

    #[test]
    fn oauth_state_is_removed_on_take() {
        let (_dir, db) = temp_db();
        let issued = Utc::now();
        db.insert_oauth_state("abc123", issued).unwrap();

        let taken = db.take_oauth_state("abc123").unwrap();
        assert_eq!(taken, Some(issued));
        assert!(db.take_oauth_state("abc123").unwrap().is_none());
    }
}
