pub mod common;
pub mod health;
pub mod invoice_items;
pub mod invoices;
pub mod suppliers;
pub mod training;
pub mod uploads;

use crate::{
    config::AppConfig,
    db::DbPool,
    extraction::FieldExtractor,
    ml::ModelRegistry,
    ocr::TextExtractor,
    services::{
        corrections::CorrectionService, documents::DocumentService,
        invoice_items::InvoiceItemService, invoices::InvoiceService, suppliers::SupplierService,
        training::TrainingService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub suppliers: Arc<SupplierService>,
    pub invoices: Arc<InvoiceService>,
    pub invoice_items: Arc<InvoiceItemService>,
    pub documents: Arc<DocumentService>,
    pub corrections: Arc<CorrectionService>,
    pub training: Arc<TrainingService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        text_extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        let field_extractor = FieldExtractor::new(config.supplier_name_heuristic());

        let documents = Arc::new(DocumentService::new(
            db_pool.clone(),
            text_extractor,
            field_extractor,
            config.upload_dir(),
        ));
        let training = Arc::new(TrainingService::new(
            db_pool.clone(),
            ModelRegistry::new(db_pool.clone()),
            documents.clone(),
            config.model_dir.clone(),
            config.training_threshold,
        ));
        let corrections = Arc::new(CorrectionService::new(db_pool.clone(), training.clone()));

        Self {
            suppliers: Arc::new(SupplierService::new(db_pool.clone())),
            invoices: Arc::new(InvoiceService::new(db_pool.clone())),
            invoice_items: Arc::new(InvoiceItemService::new(db_pool)),
            documents,
            corrections,
            training,
        }
    }
}
