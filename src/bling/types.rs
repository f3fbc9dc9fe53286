// Minimal Bling v3 DTOs and money helpers
use serde::{Deserialize, Serialize};

/// Convert integer minor units to the decimal currency values Bling expects
/// on the wire. Internal arithmetic stays in cents; this is a boundary-only
/// conversion.
pub fn cents_to_currency(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// `{ "data": ... }` wrapper used by Bling v3 responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Inner page of a contact search response: `{ data: { data: [...] } }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactPage {
    #[serde(default)]
    pub data: Vec<ContactRef>,
}

/// Contact record as returned by search and create endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nome: Option<String>,
}

/// A contact the resolver settled on; embedded verbatim in the order payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContact {
    pub id: i64,
    pub nome: String,
}

/// Which directory field a contact search keys on. Document beats email
/// beats name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactQuery {
    Document(String),
    Email(String),
    Name(String),
}

impl ContactQuery {
    pub fn param(&self) -> (&'static str, &str) {
        match self {
            ContactQuery::Document(v) => ("numeroDocumento", v),
            ContactQuery::Email(v) => ("email", v),
            ContactQuery::Name(v) => ("nome", v),
        }
    }
}

/// Bling's person-type flag: 14-digit documents are legal entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonKind {
    #[serde(rename = "F")]
    Individual,
    #[serde(rename = "J")]
    LegalEntity,
}

/// Creation payload for `POST /contatos`. Optional fields are omitted from
/// the body entirely when empty.
#[derive(Debug, Clone, Serialize)]
pub struct NewContact {
    pub nome: String,
    #[serde(rename = "tipoPessoa")]
    pub tipo_pessoa: PersonKind,
    #[serde(rename = "numeroDocumento", skip_serializing_if = "Option::is_none")]
    pub numero_documento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefone: Option<String>,
}

/// Sales-order submission payload for `POST /pedidos/vendas`.
#[derive(Debug, Clone, Serialize)]
pub struct SalesOrder {
    #[serde(rename = "numeroLoja")]
    pub numero_loja: String,
    pub data: String,
    #[serde(rename = "dataSaida")]
    pub data_saida: String,
    #[serde(rename = "dataPrevista")]
    pub data_prevista: String,
    pub contato: ResolvedContact,
    pub itens: Vec<SalesOrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parcelas: Option<Vec<Installment>>,
    pub observacoes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesOrderItem {
    pub codigo: String,
    pub descricao: String,
    pub quantidade: u32,
    pub valor: f64,
    #[serde(rename = "valorLista")]
    pub valor_lista: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Installment {
    pub id: u32,
    #[serde(rename = "dataVencimento")]
    pub data_vencimento: String,
    pub valor: f64,
    #[serde(rename = "formaPagamento")]
    pub forma_pagamento: PaymentMethodRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodRef {
    pub id: u64,
}

/// Sales-order reference returned by Bling on submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SalesOrderRef {
    #[serde(default)]
    pub id: Option<i64>,
}

/// Token endpoint response for both grant types.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}
