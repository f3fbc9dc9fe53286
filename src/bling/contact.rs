// Find-or-create reconciliation of the quote's client snapshot against the
// Bling contact directory

use std::sync::Arc;
use tracing::{debug, info};

use crate::bling::errors::{BlingApiError, OrderError};
use crate::bling::quote::QuoteRecord;
use crate::bling::rest::BlingApi;
use crate::bling::types::{ContactQuery, NewContact, PersonKind, ResolvedContact};

const FALLBACK_CONTACT_NAME: &str = "Cliente";

/// Strip a tax document down to its digits.
pub fn normalize_document(value: Option<&str>) -> String {
    value
        .unwrap_or("")
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}

/// Resolves the external contact for a quote. Searching first keeps repeated
/// approvals from proliferating duplicate contacts; creation is the fallback
/// and the last resort.
pub struct ContactResolver {
    api: Arc<dyn BlingApi>,
}

impl ContactResolver {
    pub fn new(api: Arc<dyn BlingApi>) -> Self {
        Self { api }
    }

    /// Search by document, else email, else name; create when nothing
    /// usable comes back. Empty results and 404-shaped search failures fall
    /// through to creation; any other search failure propagates, since a
    /// masked auth or network fault would otherwise surface as a confusing
    /// duplicate-create attempt.
    pub async fn resolve(&self, quote: &QuoteRecord) -> Result<ResolvedContact, OrderError> {
        let document = normalize_document(quote.client_document.as_deref());
        let name = if quote.client_name.trim().is_empty() {
            FALLBACK_CONTACT_NAME.to_string()
        } else {
            quote.client_name.clone()
        };

        let query = if !document.is_empty() {
            ContactQuery::Document(document.clone())
        } else if !quote.client_email.is_empty() {
            ContactQuery::Email(quote.client_email.clone())
        } else {
            ContactQuery::Name(name.clone())
        };

        match self.api.search_contacts(&query).await {
            Ok(contacts) => {
                for contact in contacts {
                    if let Some(id) = contact.id.filter(|id| *id != 0) {
                        let nome = contact.nome.unwrap_or_else(|| name.clone());
                        debug!(contact_id = id, "Matched existing Bling contact");
                        return Ok(ResolvedContact { id, nome });
                    }
                }
            }
            Err(err) if err.is_not_found() => {
                debug!("Contact search returned not-found, falling through to create");
            }
            Err(err) => return Err(OrderError::from(err)),
        }

        let payload = NewContact {
            nome: name.clone(),
            tipo_pessoa: if document.len() == 14 {
                PersonKind::LegalEntity
            } else {
                PersonKind::Individual
            },
            numero_documento: (!document.is_empty()).then(|| document.clone()),
            email: (!quote.client_email.is_empty()).then(|| quote.client_email.clone()),
            telefone: (!quote.client_phone.is_empty()).then(|| quote.client_phone.clone()),
        };

        let created = self
            .api
            .create_contact(&payload)
            .await
            .map_err(|err: BlingApiError| OrderError::ContactResolutionFailed(err.to_string()))?;

        match created.id.filter(|id| *id != 0) {
            Some(id) => {
                let nome = created.nome.unwrap_or(name);
                info!(contact_id = id, "Created Bling contact");
                Ok(ResolvedContact { id, nome })
            }
            None => Err(OrderError::ContactResolutionFailed(
                "create response carried no contact id".to_string(),
            )),
        }
    }
}
