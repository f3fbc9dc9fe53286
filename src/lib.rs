//! Order lifecycle core of a B2B quoting storefront.
//!
//! Quotes are captured locally, approved by an administrator, and reconciled
//! against the Bling ERP: the client snapshot is matched (or created) as a
//! Bling contact, the cart is translated into a sales-order payload and
//! submitted, and the outcome is written back atomically to the quote record.

pub mod bling;
pub mod settings;
