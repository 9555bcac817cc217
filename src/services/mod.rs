pub mod corrections;
pub mod documents;
pub mod invoice_items;
pub mod invoices;
pub mod suppliers;
pub mod training;

use crate::errors::ServiceError;
use rust_decimal::{prelude::FromPrimitive, Decimal};

/// Converts an extracted amount to a two-decimal `Decimal`.
pub(crate) fn to_money(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(2))
}

/// Underlying error text, without the service-level prefix.
pub(crate) fn raw_message(error: &ServiceError) -> String {
    match error {
        ServiceError::DatabaseError(e) => e.to_string(),
        ServiceError::ProcessingError(message)
        | ServiceError::ValidationError(message)
        | ServiceError::InternalError(message)
        | ServiceError::SerializationError(message) => message.clone(),
        other => other.to_string(),
    }
}
