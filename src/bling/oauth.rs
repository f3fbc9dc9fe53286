// Connect/callback flow for authorizing the Bling integration

use reqwest::Url;
use std::sync::Arc;
use tracing::info;

use crate::bling::errors::BlingApiError;
use crate::bling::oauth_state::StateGuard;
use crate::bling::token::{StoredToken, TokenExchange, TokenStore};

/// Authorization-code flow: builds the connect URL (issuing a state nonce)
/// and completes the callback (consuming it and persisting the token pair).
pub struct OauthFlow {
    authorize_url: String,
    client_id: String,
    redirect_uri: String,
    states: StateGuard,
    tokens: Arc<TokenStore>,
    exchange: Arc<dyn TokenExchange>,
}

impl OauthFlow {
    pub fn new(
        authorize_url: String,
        client_id: String,
        redirect_uri: String,
        states: StateGuard,
        tokens: Arc<TokenStore>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Self {
        Self {
            authorize_url,
            client_id,
            redirect_uri,
            states,
            tokens,
            exchange,
        }
    }

    /// Authorization URL for the admin to visit, with a fresh state nonce.
    pub fn connect_url(&self) -> Result<String, BlingApiError> {
        if self.client_id.is_empty() || self.redirect_uri.is_empty() {
            return Err(BlingApiError::OauthConfig);
        }
        let state = self.states.issue().map_err(BlingApiError::storage)?;
        let url = Url::parse_with_params(
            &self.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("state", state.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )
        .map_err(|e| BlingApiError::Http(e.to_string()))?;
        Ok(url.to_string())
    }

    /// Validate the callback state, exchange the code and store the token.
    /// The response must carry a refresh token or the connection is refused.
    pub async fn complete_callback(&self, code: &str, state: &str) -> Result<(), BlingApiError> {
        if code.is_empty() || state.is_empty() {
            return Err(BlingApiError::TokenExchange(
                "missing code or state parameter".to_string(),
            ));
        }
        if !self.states.consume(state).map_err(BlingApiError::storage)? {
            return Err(BlingApiError::TokenExchange(
                "unknown or expired state".to_string(),
            ));
        }
        let resp = self.exchange.exchange_code(code).await?;
        let token = StoredToken::from_response(resp, None).ok_or_else(|| {
            BlingApiError::TokenExchange("response carried no refresh token".to_string())
        })?;
        self.tokens.save(&token)?;
        info!(expires_at = %token.expires_at, "Bling connection established");
        Ok(())
    }
}
