// src/heuristics/mod.rs

mod fields;
mod ticket;

use serde::Deserialize;
use serde::Serialize;
use tracing::trace;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// One known spelling of a supplier company and the catalog name it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyAlias {
    /// Matched case-insensitively anywhere in a line.
    pub pattern: String,
    pub name: String,
}

/// Everything the extractor needs besides the text itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_companies")]
    pub companies: Vec<CompanyAlias>,
}

fn default_companies() -> Vec<CompanyAlias> {
    vec![CompanyAlias {
        pattern: "OLEOFLORES".to_string(),
        name: "Oleoflores".to_string(),
    }]
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            companies: default_companies(),
        }
    }
}

/// Best-effort fields read off one receipt scan.
///
/// Optional fields are absent when nothing matched; `raw_text` and
/// `confidence` are always carried through for auditing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedReceiptData {
    /// `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha: Option<String>,
    /// Net weight in kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kilogramos: Option<f64>,
    /// Transport guide number, digits only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numero_tiquete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valor_unitario: Option<f64>,
    /// Hint for pre-selecting a catalog company; not authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empresa_nombre: Option<String>,
    pub raw_text: String,
    /// OCR engine confidence, 0-100.
    pub confidence: f64,
}

impl ExtractedReceiptData {
    /// How many of the optional fields were found, out of how many.
    pub fn coverage(&self) -> (usize, usize) {
        let total = 5;
        let filled = [
            self.fecha.is_some(),
            self.kilogramos.is_some(),
            self.numero_tiquete.is_some(),
            self.valor_unitario.is_some(),
            self.empresa_nombre.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, total)
    }
}

/// OCR text prepared once and shared by every strategy.
pub(crate) struct ReceiptText<'a> {
    /// Exactly what the engine returned.
    raw: &'a str,
    /// Trimmed, non-empty lines in reading order.
    lines: Vec<&'a str>,
    /// `raw` lowercased with diacritics removed.
    folded: String,
}

impl<'a> ReceiptText<'a> {
    pub(crate) fn new(raw: &'a str) -> Self {
        Self {
            raw,
            lines: raw
                .split('\n')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect(),
            folded: fold(raw),
        }
    }
}

/// Lowercase and strip combining marks ("GUÍA" -> "guia").
pub(crate) fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// A pure way of reading one field. Strategies for a field are tried in
/// order and the first `Some` wins.
pub(crate) type Strategy<T> = fn(&ReceiptText<'_>) -> Option<T>;

fn first_hit<T>(
    text: &ReceiptText<'_>,
    field: &'static str,
    strategies: &[(&'static str, Strategy<T>)],
) -> Option<T> {
    strategies.iter().find_map(|(name, strategy)| {
        let hit = strategy(text)?;
        trace!(field, strategy = name, "Field matched");
        Some(hit)
    })
}

/// Extract structured receipt fields from raw OCR text.
///
/// Never fails: empty or garbage text gives a record with every optional
/// field absent.
pub fn extract_receipt(
    raw_text: &str,
    confidence: f64,
    config: &ExtractorConfig,
) -> ExtractedReceiptData {
    let text = ReceiptText::new(raw_text);

    ExtractedReceiptData {
        fecha: first_hit(&text, "fecha", fields::DATE_STRATEGIES),
        kilogramos: first_hit(&text, "kilogramos", fields::NET_WEIGHT_STRATEGIES),
        numero_tiquete: first_hit(&text, "numero_tiquete", ticket::TICKET_TIERS),
        valor_unitario: first_hit(&text, "valor_unitario", fields::UNIT_PRICE_STRATEGIES),
        empresa_nombre: fields::company_hint(&text, &config.companies),
        raw_text: raw_text.to_string(),
        confidence: clamp_confidence(confidence),
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 100.0)
    }
}
