//! Turns a stored document into raw text.
//!
//! Two backends exist. The placeholder backend ignores the file and returns a
//! fixed French invoice, which is what the demo deployment runs with. The
//! document backend reads the embedded text layer of PDFs and plain-text
//! files; raster images are rejected because no OCR engine is linked.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use strum::{Display, EnumString};
use thiserror::Error;

/// Text produced by [`PlaceholderTextExtractor`] for every document.
pub const PLACEHOLDER_INVOICE_TEXT: &str = "FACTURE N° 2025-001

Date: 15/01/2025
Échéance: 15/02/2025

FOURNISSEUR XYZ
123 rue des Exemples
75000 Paris
SIRET: 123456789

Client: Société ABC

Description                  Quantité    Prix unitaire    Total
----------------------------------------------------------------
Produit A                    2           500,25 €         1000,50 €
Service B                    1           200,00 €         200,00 €
----------------------------------------------------------------
                                        Sous-total:      1200,50 €
                                        TVA (20%):        200,08 €
                                        TOTAL:           1400,58 €
";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to extract PDF text: {0}")]
    Pdf(String),
    #[error("document is not valid UTF-8 text")]
    Encoding,
    #[error("unsupported document type: {0}")]
    Unsupported(String),
}

/// Which text extraction backend the service runs with.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OcrBackend {
    #[default]
    Placeholder,
    Document,
}

pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderTextExtractor;

impl TextExtractor for PlaceholderTextExtractor {
    fn extract_text(&self, _path: &Path) -> Result<String, ExtractionError> {
        Ok(PLACEHOLDER_INVOICE_TEXT.to_string())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentTextExtractor;

impl TextExtractor for DocumentTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => {
                // report a missing file as I/O rather than a parse failure
                if !path.exists() {
                    return Err(ExtractionError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} does not exist", path.display()),
                    )));
                }
                pdf_extract::extract_text(path).map_err(|e| ExtractionError::Pdf(e.to_string()))
            }
            "txt" => {
                let bytes = std::fs::read(path)?;
                String::from_utf8(bytes).map_err(|_| ExtractionError::Encoding)
            }
            ext if IMAGE_EXTENSIONS.contains(&ext) => Err(ExtractionError::Unsupported(format!(
                "raster image .{ext} requires an OCR engine"
            ))),
            "" => Err(ExtractionError::Unsupported("file has no extension".to_string())),
            other => Err(ExtractionError::Unsupported(format!(".{other}"))),
        }
    }
}

/// Builds the extractor for the configured backend.
pub fn text_extractor_for(backend: OcrBackend) -> Arc<dyn TextExtractor> {
    match backend {
        OcrBackend::Placeholder => Arc::new(PlaceholderTextExtractor),
        OcrBackend::Document => Arc::new(DocumentTextExtractor),
    }
}

/// True when the text looks like a real document rather than noise.
pub fn is_usable_text(text: &str) -> bool {
    text.len() > 50 && text.split_whitespace().count() > 10
}
