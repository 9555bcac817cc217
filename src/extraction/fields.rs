//! Scalar field patterns.

use once_cell::sync::Lazy;
use regex::Regex;

/// How the supplier name is guessed from the document header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SupplierNameHeuristic {
    /// First of the first five lines longer than three characters that is
    /// not an invoice title line.
    #[default]
    FirstHeaderLine,
    /// Third non-empty line of the document.
    ThirdLine,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("invoice field pattern must compile"))
        .collect()
}

static INVOICE_NUMBER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)(?:facture|invoice|n°|numéro)[\s:]*([A-Za-z0-9\-_/]{3,20})",
        r"(?i)(?:N°|No|Numéro)[\s:]?(?:facture|invoice)?[\s:]*([A-Za-z0-9\-_/]{3,20})",
        r"(?i)(?:facture|invoice)[\s:]?(?:N°|No|Numéro)?[\s:]*([A-Za-z0-9\-_/]{3,20})",
    ])
});

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)(?:date|émission|émise le)[\s:]*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})",
        r"(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})",
        r"(?i)(\d{1,2}\s+(?:janvier|février|mars|avril|mai|juin|juillet|août|septembre|octobre|novembre|décembre)\s+\d{2,4})",
    ])
});

static DUE_DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[r"(?i)(?:échéance|date d'échéance)[\s:]*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})"])
});

// Labels must not be glued to a preceding letter or hyphen ("Sous-total").
static TOTAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?im)(?:^|[^\p{L}\-])total\s*(?:ttc)?\s*:\s*(\d+[.,]\d{2})",
        r"(?im)(?:^|[^\p{L}\-])(?:total|montant|somme)[\s:]*(?:ttc|t\.t\.c\.)?[\s:]*(\d+[.,]\d{2})",
        r"(?im)(?:^|[^\p{L}\-])(?:total|montant|somme)[\s:]*(?:ttc|t\.t\.c\.)?[\s:]*(\d+)",
        r"(?im)(?:^|[^\p{L}\-])(?:ttc|t\.t\.c\.)[\s:]*(\d+[.,]\d{2})",
    ])
});

static TAX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)TVA[^:\n]*:\s*(\d+[.,]\d{2})",
        r"(?i)(?:tva|t\.v\.a\.|taxe)[\s:]*(\d+[.,]\d{2})",
        r"(?i)(?:tva|t\.v\.a\.|taxe)[\s:]*(\d+)",
    ])
});

static TAX_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:SIRET|SIREN)\s*:?\s*(\d+)").expect("tax id pattern"));

static STREET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\s+rue").expect("street pattern"));

static TITLE_LINE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)facture|invoice").expect("title line pattern"));

/// Normalizes a decimal-comma amount and parses it.
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse::<f64>().ok()
}

/// Every capture of the first group, pattern by pattern, in document order.
fn captures<'t>(patterns: &'t [Regex], text: &'t str) -> impl Iterator<Item = &'t str> + 't {
    patterns.iter().flat_map(move |re| {
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
    })
}

fn first_token(patterns: &[Regex], text: &str) -> Option<String> {
    captures(patterns, text).next().map(|s| s.trim().to_string())
}

fn first_amount(patterns: &[Regex], text: &str) -> Option<f64> {
    captures(patterns, text).find_map(parse_amount)
}

pub(super) fn extract_invoice_number(text: &str) -> Option<String> {
    first_token(&INVOICE_NUMBER_PATTERNS, text)
}

pub(super) fn extract_date(text: &str) -> Option<String> {
    first_token(&DATE_PATTERNS, text)
}

pub(super) fn extract_due_date(text: &str) -> Option<String> {
    first_token(&DUE_DATE_PATTERNS, text)
}

pub(super) fn extract_total_amount(text: &str) -> Option<f64> {
    first_amount(&TOTAL_PATTERNS, text)
}

pub(super) fn extract_tax_amount(text: &str) -> Option<f64> {
    first_amount(&TAX_PATTERNS, text)
}

fn non_empty_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

pub(super) fn extract_supplier_name(text: &str, heuristic: SupplierNameHeuristic) -> Option<String> {
    match heuristic {
        SupplierNameHeuristic::ThirdLine => non_empty_lines(text).get(2).map(|s| s.to_string()),
        SupplierNameHeuristic::FirstHeaderLine => text
            .lines()
            .take(5)
            .map(str::trim)
            .find(|line| line.chars().count() > 3 && !TITLE_LINE_PATTERN.is_match(line))
            .map(str::to_string),
    }
}

pub(super) fn extract_supplier_address(text: &str) -> Option<String> {
    let lines = non_empty_lines(text);
    (3..lines.len().min(5))
        .find(|&i| STREET_PATTERN.is_match(lines[i]))
        .map(|i| match lines.get(i + 1) {
            Some(next) => format!("{}, {}", lines[i], next),
            None => lines[i].to_string(),
        })
}

pub(super) fn extract_tax_id(text: &str) -> Option<String> {
    TAX_ID_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
