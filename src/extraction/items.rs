use once_cell::sync::Lazy;
use regex::Regex;

use super::fields::parse_amount;
use super::{ExtractedItem, DEFAULT_ITEM_TAX_RATE};

static ITEMS_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)Description(.*?)Sous-total").expect("items block pattern")
});

static ITEM_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9\s]+)\s+(\d+)\s+(\d+[.,]\d{2})\s+€\s+(\d+[.,]\d{2})\s+€")
        .expect("item row pattern")
});

/// Rows of the items table found between the `Description` header and the
/// `Sous-total` line. Rows whose amounts do not parse are skipped.
pub(super) fn extract_line_items(text: &str) -> Vec<ExtractedItem> {
    let Some(block) = ITEMS_BLOCK.captures(text).and_then(|caps| caps.get(1)) else {
        return Vec::new();
    };

    ITEM_ROW
        .captures_iter(block.as_str())
        .filter_map(|caps| {
            let description = caps[1].trim();
            if description.is_empty() {
                return None;
            }
            Some(ExtractedItem {
                description: description.to_string(),
                quantity: caps[2].parse().ok()?,
                unit_price: parse_amount(&caps[3])?,
                total_price: parse_amount(&caps[4])?,
                tax_rate: DEFAULT_ITEM_TAX_RATE,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_table_means_no_items() {
        assert!(extract_line_items("Produit A 2 10,00 € 20,00 €").is_empty());
    }

    #[test]
    fn reads_rows_inside_the_table() {
        let text = "Description | Qté | PU | Total\n-----\nWidget 3 10,00 € 30,00 €\nSous-total: 30,00 €";
        let items = extract_line_items(text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Widget");
        assert_eq!(items[0].quantity, 3.0);
        assert_eq!(items[0].total_price, 30.0);
    }
}
