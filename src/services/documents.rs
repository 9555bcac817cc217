/*!
 * # Document Ingestion
 *
 * Stores an uploaded file, runs text and field extraction over it and
 * persists the resulting invoice, supplier, line items and the initial
 * training example. Once the invoice row exists every later failure leaves
 * it in the `error` status.
 */

use super::{
    invoice_items::{InvoiceItemService, LineItemInput},
    raw_message,
    suppliers::{DetailsMerge, SupplierService},
    to_money,
};
use crate::{
    db::DbPool,
    entities::{invoice, training_data, InvoiceStatus},
    errors::ServiceError,
    extraction::{parse_invoice_date, ExtractedInvoice, FieldExtractor},
    ocr::{is_usable_text, TextExtractor},
    tracing::with_metrics,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Unchanged, Set};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessedDocument {
    pub invoice: invoice::Model,
    pub extracted_data: ExtractedInvoice,
    pub original_text: String,
}

#[derive(Clone)]
pub struct DocumentService {
    db_pool: Arc<DbPool>,
    text_extractor: Arc<dyn TextExtractor>,
    field_extractor: FieldExtractor,
    upload_dir: PathBuf,
}

impl DocumentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        text_extractor: Arc<dyn TextExtractor>,
        field_extractor: FieldExtractor,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            db_pool,
            text_extractor,
            field_extractor,
            upload_dir,
        }
    }

    /// Re-reads the text of a stored document. Missing or unreadable files
    /// yield an empty string.
    pub async fn read_stored_text(&self, file_path: Option<&str>) -> String {
        let Some(path) = file_path.map(PathBuf::from) else {
            return String::new();
        };
        match self.extract_text(path.clone()).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not re-read stored document");
                String::new()
            }
        }
    }

    /// Stores `bytes` and turns them into a processed invoice.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn process_upload(
        &self,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<ProcessedDocument, ServiceError> {
        let this = self;
        with_metrics("invoice_upload", move || async move {
            let stored = this.store(original_filename, bytes).await?;
            let invoice = this.insert_processing(&stored, original_filename).await?;

            match this.run_pipeline(&invoice, &stored).await {
                Ok(document) => {
                    metrics::counter!("invoices.processed", 1);
                    Ok(document)
                }
                Err(e) => {
                    let message = raw_message(&e);
                    error!(invoice_id = %invoice.id, error = %message, "Invoice processing failed");
                    this.mark_failed(invoice.id).await;
                    metrics::counter!("invoices.failed", 1);
                    Err(ServiceError::ProcessingError(message))
                }
            }
        })
        .await
    }

    async fn store(&self, original_filename: &str, bytes: &[u8]) -> Result<PathBuf, ServiceError> {
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| ServiceError::ProcessingError(e.to_string()))?;

        let path = self.upload_dir.join(stored_file_name(original_filename));
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to store upload");
            ServiceError::ProcessingError(e.to_string())
        })?;
        Ok(path)
    }

    async fn insert_processing(
        &self,
        stored: &Path,
        original_filename: &str,
    ) -> Result<invoice::Model, ServiceError> {
        let now = Utc::now();
        let invoice = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(None),
            issue_date: Set(None),
            due_date: Set(None),
            supplier_id: Set(None),
            total_amount: Set(None),
            tax_amount: Set(None),
            status: Set(InvoiceStatus::Processing),
            confidence_score: Set(0.0),
            file_path: Set(Some(stored.to_string_lossy().into_owned())),
            original_filename: Set(Some(original_filename.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| ServiceError::ProcessingError(e.to_string()))?;

        info!(invoice_id = %invoice.id, "Invoice registered for processing");
        Ok(invoice)
    }

    async fn run_pipeline(
        &self,
        invoice: &invoice::Model,
        stored: &Path,
    ) -> Result<ProcessedDocument, ServiceError> {
        let db = &*self.db_pool;
        let text = self.extract_text(stored.to_path_buf()).await?;
        if !is_usable_text(&text) {
            warn!(invoice_id = %invoice.id, chars = text.len(), "Extraction produced little text");
        }
        let extracted = self.field_extractor.extract(&text);

        let supplier_id = match extracted.supplier.name.as_deref() {
            Some(name) => {
                let supplier = SupplierService::get_or_create_by_name(db, name).await?;
                let supplier = SupplierService::merge_details(
                    db,
                    supplier,
                    extracted.supplier.address.as_deref(),
                    extracted.supplier.tax_id.as_deref(),
                    DetailsMerge::FillMissing,
                )
                .await?;
                Some(supplier.id)
            }
            None => None,
        };

        let mut active: invoice::ActiveModel = invoice.clone().into();
        active.invoice_number = Set(extracted.invoice_number.clone());
        active.issue_date = Set(extracted.date.as_deref().and_then(parse_invoice_date));
        active.due_date = Set(extracted.due_date.as_deref().and_then(parse_invoice_date));
        active.supplier_id = Set(supplier_id);
        active.total_amount = Set(extracted.total_amount.and_then(to_money));
        active.tax_amount = Set(extracted.tax_amount.and_then(to_money));
        active.confidence_score = Set(extracted.confidence_score);
        active.status = Set(InvoiceStatus::Processed);
        active.updated_at = Set(Utc::now());
        let invoice = active.update(db).await?;

        let items: Vec<LineItemInput> = extracted.items.iter().map(LineItemInput::from).collect();
        InvoiceItemService::insert_all(db, invoice.id, &items).await?;

        let snapshot = serde_json::to_value(&extracted)?;
        let now = Utc::now();
        training_data::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice.id),
            original_extraction: Set(snapshot.clone()),
            corrected_extraction: Set(snapshot),
            used_for_training: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(
            invoice_id = %invoice.id,
            confidence = extracted.confidence_score,
            items = items.len(),
            "Invoice processed"
        );
        Ok(ProcessedDocument {
            invoice,
            extracted_data: extracted,
            original_text: text,
        })
    }

    async fn extract_text(&self, path: PathBuf) -> Result<String, ServiceError> {
        let extractor = Arc::clone(&self.text_extractor);
        let text = tokio::task::spawn_blocking(move || extractor.extract_text(&path))
            .await
            .map_err(|e| ServiceError::ProcessingError(e.to_string()))??;
        Ok(text)
    }

    async fn mark_failed(&self, invoice_id: Uuid) {
        let failed = invoice::ActiveModel {
            id: Unchanged(invoice_id),
            status: Set(InvoiceStatus::Error),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Err(e) = failed.update(&*self.db_pool).await {
            error!(invoice_id = %invoice_id, error = %e, "Could not mark invoice as failed");
        }
    }
}

/// `<uuid>.<ext>` where the extension is taken from the client file name.
fn stored_file_name(original_filename: &str) -> String {
    let extension = Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    }
}
