// Bling provider module

pub mod contact;
pub mod database;
pub mod errors;
pub mod oauth;
pub mod oauth_state;
pub mod order_flow;
pub mod order_payload;
pub mod quote;
pub mod rest;
pub mod token;
pub mod types;

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::settings::BlingSettings;
use self::database::OrderDatabase;
use self::oauth::OauthFlow;
use self::oauth_state::StateGuard;
use self::order_flow::OrderProcessor;
use self::rest::{BlingRestClient, HttpTokenExchange};
use self::token::{TokenExchange, TokenStore};

/// Facade wiring configuration, storage, the token store and the REST
/// client together. Cheap to clone; the heavy parts are shared.
#[derive(Clone)]
pub struct BlingProvider {
    cfg: BlingSettings,
    db: OrderDatabase,
    rest: BlingRestClient,
    tokens: Arc<TokenStore>,
    states: StateGuard,
    exchange: Arc<dyn TokenExchange>,
}

impl BlingProvider {
    // Build reqwest client with rustls and timeout from cfg, store cfg clone.
    pub fn new(cfg: BlingSettings, db: OrderDatabase) -> Result<Self, errors::BlingApiError> {
        let timeout = Duration::from_millis(if cfg.timeout_ms > 0 {
            cfg.timeout_ms
        } else {
            15_000
        });
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| errors::BlingApiError::Http(e.to_string()))?;

        let exchange: Arc<dyn TokenExchange> = Arc::new(HttpTokenExchange::new(
            http.clone(),
            cfg.token_url.clone(),
            cfg.client_id.clone(),
            cfg.client_secret.clone(),
            cfg.redirect_uri.clone(),
        ));
        let tokens = Arc::new(
            TokenStore::new(db.clone(), exchange.clone()).with_refresh_skew(cfg.token_refresh_skew),
        );
        let rest = BlingRestClient::new(http, cfg.api_base.clone(), tokens.clone());
        let states = StateGuard::new(db.clone()).with_ttl(cfg.oauth_state_ttl);

        Ok(Self {
            cfg,
            db,
            rest,
            tokens,
            states,
            exchange,
        })
    }

    pub fn rest(&self) -> &BlingRestClient {
        &self.rest
    }

    pub fn tokens(&self) -> Arc<TokenStore> {
        Arc::clone(&self.tokens)
    }

    pub fn oauth(&self) -> OauthFlow {
        OauthFlow::new(
            self.cfg.authorize_url.clone(),
            self.cfg.client_id.clone(),
            self.cfg.redirect_uri.clone(),
            self.states.clone(),
            Arc::clone(&self.tokens),
            Arc::clone(&self.exchange),
        )
    }

    pub fn orders(&self) -> OrderProcessor {
        OrderProcessor::new(
            self.db.clone(),
            Arc::new(self.rest.clone()),
            self.cfg.payment_method_id,
        )
    }
}
