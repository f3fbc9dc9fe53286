// OAuth token persistence and refresh-on-demand

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::bling::database::OrderDatabase;
use crate::bling::errors::BlingApiError;
use crate::bling::types::TokenResponse;

const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Singleton token record. Refresh replaces it, never appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredToken {
    /// Build a record from a token-endpoint response. `previous_refresh`
    /// covers refresh responses that omit a new refresh token; `None` is
    /// returned when no refresh token is available from either source.
    pub fn from_response(resp: TokenResponse, previous_refresh: Option<String>) -> Option<Self> {
        let refresh_token = resp.refresh_token.or(previous_refresh)?;
        let now = Utc::now();
        Some(Self {
            access_token: resp.access_token,
            refresh_token,
            expires_at: now + ChronoDuration::seconds(resp.expires_in),
            token_type: resp.token_type,
            scope: resp.scope,
            created_at: now,
        })
    }
}

/// Token endpoint operations, kept behind a trait so the store can be
/// exercised without a network.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, BlingApiError>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, BlingApiError>;
}

/// Database-backed token store with refresh-on-demand.
pub struct TokenStore {
    db: OrderDatabase,
    exchange: Arc<dyn TokenExchange>,
    refresh_skew: Duration,
}

impl TokenStore {
    pub fn new(db: OrderDatabase, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            db,
            exchange,
            refresh_skew: DEFAULT_REFRESH_SKEW,
        }
    }

    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    /// Current access token, refreshed when within the expiry skew.
    ///
    /// Returns `Ok(None)` only if no token has ever been stored. A failed
    /// refresh surfaces the error and leaves the stale record in place so a
    /// later retry does not require re-authorization.
    pub async fn access_token(&self) -> Result<Option<String>, BlingApiError> {
        let Some(token) = self.db.get_token().map_err(BlingApiError::storage)? else {
            return Ok(None);
        };

        let skew = ChronoDuration::from_std(self.refresh_skew)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));
        if token.expires_at - Utc::now() > skew {
            return Ok(Some(token.access_token));
        }

        debug!("Bling token within expiry skew, refreshing");
        let refreshed = self.exchange.refresh(&token.refresh_token).await?;
        let stored = StoredToken::from_response(refreshed, Some(token.refresh_token))
            .ok_or_else(|| BlingApiError::TokenExchange("refresh response unusable".to_string()))?;
        self.db.put_token(&stored).map_err(BlingApiError::storage)?;
        info!(expires_at = %stored.expires_at, "Refreshed Bling access token");
        Ok(Some(stored.access_token))
    }

    /// Idempotent upsert of the singleton token record.
    pub fn save(&self, token: &StoredToken) -> Result<(), BlingApiError> {
        self.db.put_token(token).map_err(BlingApiError::storage)
    }

    /// Whether a token record exists at all, regardless of freshness.
    pub fn connected(&self) -> Result<bool, BlingApiError> {
        Ok(self
            .db
            .get_token()
            .map_err(BlingApiError::storage)?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubExchange {
        refresh_calls: AtomicUsize,
        fail: bool,
        omit_refresh_token: bool,
    }

    impl StubExchange {
        fn new() -> Self {
            Self {
                refresh_calls: AtomicUsize::new(0),
                fail: false,
                omit_refresh_token: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl TokenExchange for StubExchange {
        async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, BlingApiError> {
            unreachable!("token store never exchanges authorization codes")
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, BlingApiError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BlingApiError::Api {
                    status: 400,
                    message: "invalid_grant".to_string(),
                });
            }
            Ok(TokenResponse {
                access_token: "fresh-access".to_string(),
                refresh_token: if self.omit_refresh_token {
                    None
                } else {
                    Some("fresh-refresh".to_string())
                },
                expires_in: 3600,
                token_type: Some("Bearer".to_string()),
                scope: None,
            })
        }
    }

    fn temp_db() -> (tempfile::TempDir, OrderDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let db = OrderDatabase::new(dir.path().join("orders.redb")).unwrap();
        (dir, db)
    }

    fn stored(expires_in_secs: i64) -> StoredToken {
        StoredToken {
            access_token: "stored-access".to_string(),
            refresh_token: "stored-refresh".to_string(),
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in_secs),
            token_type: Some("Bearer".to_string()),
            scope: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn none_when_never_connected() {
        let (_dir, db) = temp_db();
        let store = TokenStore::new(db, Arc::new(StubExchange::new()));
        assert_eq!(store.access_token().await.unwrap(), None);
        assert!(!store.connected().unwrap());
    }

    #[tokio::test]
    async fn fresh_token_skips_refresh() {
        let (_dir, db) = temp_db();
        let exchange = Arc::new(StubExchange::new());
        let store = TokenStore::new(db, exchange.clone());
        store.save(&stored(3600)).unwrap();

        let token = store.access_token().await.unwrap();
        assert_eq!(token.as_deref(), Some("stored-access"));
        assert_eq!(exchange.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn near_expiry_token_is_refreshed_and_persisted() {
        let (_dir, db) = temp_db();
        let exchange = Arc::new(StubExchange::new());
        let store = TokenStore::new(db.clone(), exchange.clone());
        store.save(&stored(30)).unwrap();

        let token = store.access_token().await.unwrap();
        assert_eq!(token.as_deref(), Some("fresh-access"));
        assert_eq!(exchange.refresh_calls.load(Ordering::SeqCst), 1);

        let persisted = db.get_token().unwrap().unwrap();
        assert_eq!(persisted.access_token, "fresh-access");
        assert_eq!(persisted.refresh_token, "fresh-refresh");
        assert!(persisted.expires_at > Utc::now() + ChronoDuration::seconds(3000));
    }

    #[tokio::test]
    async fn refresh_response_without_token_keeps_previous_refresh() {
        let (_dir, db) = temp_db();
        let exchange = Arc::new(StubExchange {
            omit_refresh_token: true,
            ..StubExchange::new()
        });
        let store = TokenStore::new(db.clone(), exchange);
        store.save(&stored(0)).unwrap();

        store.access_token().await.unwrap();
        let persisted = db.get_token().unwrap().unwrap();
        assert_eq!(persisted.refresh_token, "stored-refresh");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_token() {
        let (_dir, db) = temp_db();
        let store = TokenStore::new(db.clone(), Arc::new(StubExchange::failing()));
        let stale = stored(10);
        store.save(&stale).unwrap();

        let err = store.access_token().await.unwrap_err();
        assert!(matches!(err, BlingApiError::Api { status: 400, .. }));

        // The stale record survives so a later retry can attempt again.
        let persisted = db.get_token().unwrap().unwrap();
        assert_eq!(persisted.access_token, "stored-access");
        assert_eq!(persisted.refresh_token, "stored-refresh");
    }
}
