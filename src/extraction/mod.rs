/*!
 * # Invoice Field Extraction
 *
 * Rule-based extraction of structured invoice fields from raw document text.
 *
 * Every field is extracted independently and on a best-effort basis: a field
 * that cannot be found is `None` (or an empty list for line items), never an
 * error. When several patterns are declared for one field, the first pattern
 * in declaration order that matches anywhere in the text wins. Matches are
 * not ranked by specificity.
 */

mod dates;
mod fields;
mod items;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

pub use dates::parse_invoice_date;
pub use fields::{parse_amount, SupplierNameHeuristic};

/// Tax rate applied to every extracted line item.
pub const DEFAULT_ITEM_TAX_RATE: f64 = 20.0;

/// Number of scalar fields that make up the confidence score.
const CONFIDENCE_FIELDS: usize = 5;

/// Supplier block found in the document header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractedSupplier {
    pub name: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
}

/// A single line of the items table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractedItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    pub tax_rate: f64,
}

/// Structured candidate data produced from raw invoice text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractedInvoice {
    pub invoice_number: Option<String>,
    /// Issue date exactly as it appears in the document.
    pub date: Option<String>,
    pub due_date: Option<String>,
    pub total_amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub supplier: ExtractedSupplier,
    pub items: Vec<ExtractedItem>,
    /// Fraction of the five scalar fields that were found, in `[0, 1]`.
    pub confidence_score: f64,
}

impl ExtractedInvoice {
    /// How many of the scored scalar fields were found, out of how many.
    pub fn coverage(&self) -> (usize, usize) {
        let filled = [
            self.invoice_number.is_some(),
            self.date.is_some(),
            self.total_amount.is_some(),
            self.tax_amount.is_some(),
            self.supplier.name.is_some(),
        ]
        .iter()
        .filter(|&&present| present)
        .count();
        (filled, CONFIDENCE_FIELDS)
    }

    /// Recomputes `confidence_score` from the currently populated fields.
    pub fn score(mut self) -> Self {
        let (filled, total) = self.coverage();
        self.confidence_score = filled as f64 / total as f64;
        self
    }
}

/// Configurable field extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldExtractor {
    supplier_name: SupplierNameHeuristic,
}

impl FieldExtractor {
    pub fn new(supplier_name: SupplierNameHeuristic) -> Self {
        Self { supplier_name }
    }

    pub fn supplier_name_heuristic(&self) -> SupplierNameHeuristic {
        self.supplier_name
    }

    /// Extracts every supported field from `text`.
    pub fn extract(&self, text: &str) -> ExtractedInvoice {
        ExtractedInvoice {
            invoice_number: fields::extract_invoice_number(text),
            date: fields::extract_date(text),
            due_date: fields::extract_due_date(text),
            total_amount: fields::extract_total_amount(text),
            tax_amount: fields::extract_tax_amount(text),
            supplier: ExtractedSupplier {
                name: fields::extract_supplier_name(text, self.supplier_name),
                address: fields::extract_supplier_address(text),
                tax_id: fields::extract_tax_id(text),
            },
            items: items::extract_line_items(text),
            confidence_score: 0.0,
        }
        .score()
    }
}

/// Extracts fields with the default configuration.
pub fn extract_invoice(text: &str) -> ExtractedInvoice {
    FieldExtractor::default().extract(text)
}

impl FromStr for SupplierNameHeuristic {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "header" | "first-header-line" => Ok(Self::FirstHeaderLine),
            "positional" | "third-line" => Ok(Self::ThirdLine),
            other => Err(format!("unknown supplier name heuristic: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ocr::PLACEHOLDER_INVOICE_TEXT as SAMPLE_INVOICE;

    #[test]
    fn extracts_sample_invoice_scalars() {
        let data = extract_invoice(SAMPLE_INVOICE);

        assert_eq!(data.invoice_number.as_deref(), Some("2025-001"));
        assert_eq!(data.date.as_deref(), Some("15/01/2025"));
        assert_eq!(data.due_date.as_deref(), Some("15/02/2025"));
        assert_eq!(data.total_amount, Some(1400.58));
        assert_eq!(data.tax_amount, Some(200.08));
        assert_eq!(data.supplier.tax_id.as_deref(), Some("123456789"));
        assert_eq!(
            data.supplier.address.as_deref(),
            Some("123 rue des Exemples, 75000 Paris")
        );
    }

    #[test]
    fn extracts_sample_invoice_items() {
        let data = extract_invoice(SAMPLE_INVOICE);

        assert_eq!(data.items.len(), 2);
        assert_eq!(data.items[0].description, "Produit A");
        assert_eq!(data.items[0].quantity, 2.0);
        assert_eq!(data.items[0].unit_price, 500.25);
        assert_eq!(data.items[0].total_price, 1000.50);
        assert_eq!(data.items[0].tax_rate, DEFAULT_ITEM_TAX_RATE);
        assert_eq!(data.items[1].description, "Service B");
        assert_eq!(data.items[1].total_price, 200.0);
    }

    #[test]
    fn full_sample_has_full_confidence() {
        let data = extract_invoice(SAMPLE_INVOICE);
        assert_eq!(data.coverage(), (5, 5));
        assert!((data.confidence_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_text_yields_nothing() {
        let data = extract_invoice("");
        assert_eq!(data, ExtractedInvoice::default());
        assert_eq!(data.confidence_score, 0.0);
    }

    #[test]
    fn confidence_counts_matched_fields() {
        let data = extract_invoice("Date: 01/02/2024\nTOTAL: 10,00");
        // date, total and the header-line supplier guess ("Date: 01/02/2024")
        assert_eq!(data.coverage(), (3, 5));
        assert!((data.confidence_score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn positional_heuristic_picks_third_non_empty_line() {
        let extractor = FieldExtractor::new(SupplierNameHeuristic::ThirdLine);
        let data = extractor.extract("Facture 123\n\nACME SARL\nFOURNISSEUR XYZ\n");
        assert_eq!(data.supplier.name.as_deref(), Some("FOURNISSEUR XYZ"));
    }

    #[test]
    fn heuristic_parses_from_config_strings() {
        assert_eq!(
            "header".parse::<SupplierNameHeuristic>(),
            Ok(SupplierNameHeuristic::FirstHeaderLine)
        );
        assert_eq!(
            "Positional".parse::<SupplierNameHeuristic>(),
            Ok(SupplierNameHeuristic::ThirdLine)
        );
        assert!("nearest".parse::<SupplierNameHeuristic>().is_err());
    }
}
