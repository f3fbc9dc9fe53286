// Bling-specific error types and mappings

use serde::Deserialize;
use thiserror::Error;

use crate::bling::quote::QuoteValidationError;

// Bling REST error envelope: { error: { type, message, description } }
#[derive(Debug, Clone, Deserialize)]
pub struct BlingErrorEnvelope {
    pub error: BlingErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlingErrorBody {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub message: Option<String>,
    pub description: Option<String>,
}

impl BlingErrorBody {
    fn summary(&self) -> String {
        match (&self.message, &self.description) {
            (Some(m), Some(d)) => format!("{m}: {d}"),
            (Some(m), None) => m.clone(),
            (None, Some(d)) => d.clone(),
            (None, None) => self.type_.clone().unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// Transport-level failures talking to the Bling API or token endpoint.
#[derive(Debug, Error)]
pub enum BlingApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("bling error: status={status} {message}")]
    Api { status: u16, message: String },
    #[error("bling account not connected")]
    NotConnected,
    #[error("bling oauth client not configured")]
    OauthConfig,
    #[error("token exchange rejected: {0}")]
    TokenExchange(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl BlingApiError {
    pub(crate) fn storage(e: impl std::fmt::Display) -> Self {
        BlingApiError::Storage(e.to_string())
    }

    pub fn map_response(status: u16, body: &str) -> Self {
        if let Ok(env) = serde_json::from_str::<BlingErrorEnvelope>(body) {
            BlingApiError::Api {
                status,
                message: env.error.summary(),
            }
        } else if body.is_empty() {
            BlingApiError::Api {
                status,
                message: "empty error body".to_string(),
            }
        } else {
            BlingApiError::Api {
                status,
                message: body.to_string(),
            }
        }
    }

    /// Upstream HTTP status, when one was observed.
    pub fn status(&self) -> Option<u16> {
        match self {
            BlingApiError::Api { status, .. } => Some(*status),
            BlingApiError::NotConnected => Some(401),
            _ => None,
        }
    }

    /// True for responses shaped like "the searched entity does not exist",
    /// which the contact resolver treats as a miss rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlingApiError::Api { status: 404, .. })
    }
}

/// Caller-facing taxonomy for the order lifecycle.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("bling unavailable: {message}")]
    IntegrationUnavailable {
        message: String,
        status: Option<u16>,
    },
    #[error("contact not found nor created: {0}")]
    ContactResolutionFailed(String),
    #[error("quote not ready for submission: {0}")]
    InvalidQuoteForSubmission(&'static str),
    #[error("invalid quote input: {0}")]
    InvalidInput(#[from] QuoteValidationError),
    #[error("quote already processed")]
    Conflict,
    #[error("quote not found")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<BlingApiError> for OrderError {
    fn from(e: BlingApiError) -> Self {
        let status = e.status();
        OrderError::IntegrationUnavailable {
            message: e.to_string(),
            status,
        }
    }
}

impl OrderError {
    pub(crate) fn storage(e: impl std::fmt::Display) -> Self {
        OrderError::Storage(e.to_string())
    }

    /// Map order error to HTTP-equivalent status code
    pub fn status_code(&self) -> u16 {
        match self {
            OrderError::IntegrationUnavailable { status, .. } => status.unwrap_or(502),
            OrderError::ContactResolutionFailed(_) => 502,
            OrderError::InvalidQuoteForSubmission(_) => 400,
            OrderError::InvalidInput(_) => 400,
            OrderError::Conflict => 409,
            OrderError::NotFound => 404,
            OrderError::Storage(_) => 500,
        }
    }
}
