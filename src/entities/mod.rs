//! Database entities.

pub mod invoice;
pub mod invoice_item;
pub mod ml_model;
pub mod supplier;
pub mod training_data;

pub use invoice::InvoiceStatus;
