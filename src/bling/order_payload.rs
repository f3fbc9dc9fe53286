// Quote → Bling sales-order payload transformation

use chrono::NaiveDate;

use crate::bling::errors::OrderError;
use crate::bling::quote::QuoteRecord;
use crate::bling::types::{
    cents_to_currency, Installment, PaymentMethodRef, ResolvedContact, SalesOrder, SalesOrderItem,
};

/// Submission preconditions, checked before any network call.
pub fn ensure_submittable(quote: &QuoteRecord) -> Result<(), OrderError> {
    if quote.client_name.trim().is_empty() {
        return Err(OrderError::InvalidQuoteForSubmission(
            "client name is missing",
        ));
    }
    if quote.items.is_empty() {
        return Err(OrderError::InvalidQuoteForSubmission("quote has no items"));
    }
    Ok(())
}

/// Build the sales-order payload for a quote and its resolved contact.
///
/// Order, dispatch and expected dates all carry `today` (single-day
/// turnaround). The quote's order number goes out as `numeroLoja` so the
/// receiving side can correlate resubmissions. An installment plan covering
/// the full total, due today, is attached only when a payment-method id is
/// configured.
pub fn build_sales_order(
    quote: &QuoteRecord,
    contact: ResolvedContact,
    today: NaiveDate,
    payment_method_id: Option<u64>,
) -> Result<SalesOrder, OrderError> {
    ensure_submittable(quote)?;

    let date = today.format("%Y-%m-%d").to_string();
    let itens = quote
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| SalesOrderItem {
            codigo: item
                .product_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("ITEM-{}", index + 1)),
            descricao: if item.product_name.is_empty() {
                format!("Item {}", index + 1)
            } else {
                item.product_name.clone()
            },
            quantidade: item.quantity,
            valor: cents_to_currency(item.unit_cents),
            valor_lista: cents_to_currency(item.unit_cents),
        })
        .collect();

    let parcelas = payment_method_id.map(|id| {
        vec![Installment {
            id: 0,
            data_vencimento: date.clone(),
            valor: cents_to_currency(quote.total_cents),
            forma_pagamento: PaymentMethodRef { id },
        }]
    });

    Ok(SalesOrder {
        numero_loja: quote.order_number.clone(),
        data: date.clone(),
        data_saida: date.clone(),
        data_prevista: date,
        contato: contact,
        itens,
        parcelas,
        observacoes: quote.observations.clone().unwrap_or_default(),
    })
}
