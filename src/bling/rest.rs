// Bling v3 REST client
// Bearer-authenticated JSON calls on top of the token store; outbound calls
// are single-attempt, manual re-approval being the only retry path.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::bling::errors::BlingApiError;
use crate::bling::token::{TokenExchange, TokenStore};
use crate::bling::types::{
    ContactPage, ContactQuery, ContactRef, Envelope, NewContact, SalesOrder, SalesOrderRef,
    TokenResponse,
};

/// Operations the order flow needs from Bling, as a seam for test doubles.
#[async_trait]
pub trait BlingApi: Send + Sync {
    async fn search_contacts(&self, query: &ContactQuery)
        -> Result<Vec<ContactRef>, BlingApiError>;
    async fn create_contact(&self, contact: &NewContact) -> Result<ContactRef, BlingApiError>;
    async fn create_sales_order(&self, order: &SalesOrder)
        -> Result<SalesOrderRef, BlingApiError>;
}

#[derive(Clone)]
pub struct BlingRestClient {
    http: Client,
    api_base: String,
    tokens: Arc<TokenStore>,
}

impl BlingRestClient {
    pub fn new(http: Client, api_base: String, tokens: Arc<TokenStore>) -> Self {
        Self {
            http,
            api_base,
            tokens,
        }
    }

    async fn bearer(&self) -> Result<String, BlingApiError> {
        self.tokens
            .access_token()
            .await?
            .ok_or(BlingApiError::NotConnected)
    }

    fn map_error(status: StatusCode, body: &str) -> BlingApiError {
        BlingApiError::map_response(status.as_u16(), body)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, BlingApiError> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.api_base, endpoint);
        let query: Vec<(&str, &str)> = params
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .copied()
            .collect();
        let resp = self
            .http
            .get(url)
            .query(&query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BlingApiError::Http(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BlingApiError::Decode(e.to_string()))?;
        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| BlingApiError::Decode(e.to_string()))
        } else {
            Err(Self::map_error(status, &text))
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, BlingApiError> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.api_base, endpoint);
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| BlingApiError::Http(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BlingApiError::Decode(e.to_string()))?;
        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| BlingApiError::Decode(e.to_string()))
        } else {
            Err(Self::map_error(status, &text))
        }
    }

    /// Raw paged read used by the listing proxies.
    #[instrument(skip(self), fields(method = "GET", path = %endpoint))]
    pub async fn list(
        &self,
        endpoint: &str,
        page: u32,
        limit: u32,
    ) -> Result<serde_json::Value, BlingApiError> {
        info!(target: "bling", method = "GET", path = %endpoint, page, limit, "bling request");
        let page = page.to_string();
        let limit = limit.to_string();
        self.get(endpoint, &[("pagina", page.as_str()), ("limite", limit.as_str())])
            .await
    }

    pub async fn list_contacts(&self, page: u32, limit: u32) -> Result<serde_json::Value, BlingApiError> {
        self.list("/contatos", page, limit).await
    }

    pub async fn list_products(&self, page: u32, limit: u32) -> Result<serde_json::Value, BlingApiError> {
        self.list("/produtos", page, limit).await
    }

    pub async fn list_stock_balances(&self, page: u32, limit: u32) -> Result<serde_json::Value, BlingApiError> {
        self.list("/estoques/saldos", page, limit).await
    }

    pub async fn list_sales_orders(&self, page: u32, limit: u32) -> Result<serde_json::Value, BlingApiError> {
        self.list("/pedidos/vendas", page, limit).await
    }

    pub async fn list_sellers(&self, page: u32, limit: u32) -> Result<serde_json::Value, BlingApiError> {
        self.list("/vendedores", page, limit).await
    }
}

#[async_trait]
impl BlingApi for BlingRestClient {
    // GET /contatos with the best single match only
    #[instrument(skip(self), fields(method = "GET", path = "/contatos"))]
    async fn search_contacts(
        &self,
        query: &ContactQuery,
    ) -> Result<Vec<ContactRef>, BlingApiError> {
        let (key, value) = query.param();
        info!(
            target: "bling",
            method = "GET",
            path = "/contatos",
            query_field = key,
            "bling request"
        );
        let env: Envelope<ContactPage> = self
            .get("/contatos", &[("pagina", "1"), ("limite", "1"), (key, value)])
            .await?;
        Ok(env.data.data)
    }

    // POST /contatos
    #[instrument(skip(self, contact), fields(method = "POST", path = "/contatos"))]
    async fn create_contact(&self, contact: &NewContact) -> Result<ContactRef, BlingApiError> {
        info!(
            target: "bling",
            method = "POST",
            path = "/contatos",
            person_kind = ?contact.tipo_pessoa,
            "bling request"
        );
        let env: Envelope<ContactRef> = self.post("/contatos", contact).await?;
        Ok(env.data)
    }

    // POST /pedidos/vendas
    #[instrument(skip(self, order), fields(method = "POST", path = "/pedidos/vendas"))]
    async fn create_sales_order(
        &self,
        order: &SalesOrder,
    ) -> Result<SalesOrderRef, BlingApiError> {
        info!(
            target: "bling",
            method = "POST",
            path = "/pedidos/vendas",
            order_number = %order.numero_loja,
            items = order.itens.len(),
            "bling request"
        );
        let env: Envelope<SalesOrderRef> = self.post("/pedidos/vendas", order).await?;
        Ok(env.data)
    }
}

/// Token-endpoint client: Basic-authenticated form posts for both grants.
pub struct HttpTokenExchange {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl HttpTokenExchange {
    pub fn new(
        http: Client,
        token_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    async fn exchange(&self, params: &[(&str, &str)]) -> Result<TokenResponse, BlingApiError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(BlingApiError::OauthConfig);
        }
        let resp = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| BlingApiError::Http(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BlingApiError::Decode(e.to_string()))?;
        if !status.is_success() {
            let detail = if text.is_empty() {
                format!("status={}", status.as_u16())
            } else {
                text
            };
            return Err(BlingApiError::TokenExchange(detail));
        }
        serde_json::from_str(&text).map_err(|e| BlingApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    #[instrument(skip(self, code), fields(grant = "authorization_code"))]
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, BlingApiError> {
        if self.redirect_uri.is_empty() {
            return Err(BlingApiError::OauthConfig);
        }
        info!(target: "bling", grant = "authorization_code", "token request");
        self.exchange(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    #[instrument(skip(self, refresh_token), fields(grant = "refresh_token"))]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, BlingApiError> {
        info!(target: "bling", grant = "refresh_token", "token request");
        self.exchange(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}
