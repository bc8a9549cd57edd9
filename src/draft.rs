// src/draft.rs

use crate::heuristics::ExtractedReceiptData;
use serde::{Deserialize, Serialize};

/// A supplier company from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Empresa {
    pub id: String,
    pub nombre: String,
    #[serde(default = "default_activo")]
    pub activo: bool,
}

fn default_activo() -> bool {
    true
}

/// First active company whose name contains the hint, ignoring case.
pub fn suggest_empresa<'a>(catalog: &'a [Empresa], hint: &str) -> Option<&'a Empresa> {
    let hint = hint.trim().to_lowercase();
    if hint.is_empty() {
        return None;
    }
    catalog
        .iter()
        .filter(|e| e.activo)
        .find(|e| e.nombre.to_lowercase().contains(&hint))
}

/// A purchase-receipt form pre-filled from a scan, waiting for a human to
/// confirm it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDraft {
    pub fecha: Option<String>,
    pub empresa_id: Option<String>,
    /// Never read off the receipt; always chosen by the operator.
    pub comprador_id: Option<String>,
    pub numero_tiquete: Option<String>,
    pub kilogramos: Option<f64>,
    pub valor_unitario: Option<f64>,
    pub observaciones: String,
}

impl ReceiptDraft {
    pub fn from_extraction(data: &ExtractedReceiptData, catalog: &[Empresa]) -> Self {
        let empresa_id = data
            .empresa_nombre
            .as_deref()
            .and_then(|hint| suggest_empresa(catalog, hint))
            .map(|e| e.id.clone());

        Self {
            fecha: data.fecha.clone(),
            empresa_id,
            comprador_id: None,
            numero_tiquete: data.numero_tiquete.clone(),
            kilogramos: data.kilogramos,
            valor_unitario: data.valor_unitario,
            observaciones: format!(
                "Escaneado automáticamente ({:.0}% confianza)",
                data.confidence.round()
            ),
        }
    }

    /// Required fields still empty, in form order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.fecha.as_deref().is_none_or(str::is_empty) {
            missing.push("fecha");
        }
        if self.empresa_id.is_none() {
            missing.push("empresaId");
        }
        if self.comprador_id.is_none() {
            missing.push("compradorId");
        }
        if self.numero_tiquete.as_deref().is_none_or(str::is_empty) {
            missing.push("numeroTiquete");
        }
        if !self.kilogramos.is_some_and(|kg| kg > 0.0) {
            missing.push("kilogramos");
        }
        if !self.valor_unitario.is_some_and(|v| v > 0.0) {
            missing.push("valorUnitario");
        }
        missing
    }

    /// Weight times unit price, once both are known.
    pub fn valor_total(&self) -> Option<f64> {
        Some(self.kilogramos? * self.valor_unitario?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Empresa> {
        vec![
            Empresa {
                id: "e-0".to_string(),
                nombre: "Oleoflores Antigua".to_string(),
                activo: false,
            },
            Empresa {
                id: "e-1".to_string(),
                nombre: "Extractora Oleoflores S.A.S.".to_string(),
                activo: true,
            },
            Empresa {
                id: "e-2".to_string(),
                nombre: "Palmas del Sur".to_string(),
                activo: true,
            },
        ]
    }

    #[test]
    fn test_suggest_skips_inactive_and_ignores_case() {
        let catalog = catalog();
        assert_eq!(suggest_empresa(&catalog, "OLEOFLORES").map(|e| e.id.as_str()), Some("e-1"));
        assert_eq!(suggest_empresa(&catalog, "palmas").map(|e| e.id.as_str()), Some("e-2"));
        assert_eq!(suggest_empresa(&catalog, "Agropalma"), None);
        assert_eq!(suggest_empresa(&catalog, "  "), None);
    }

    #[test]
    fn test_draft_from_full_extraction() {
        let data = ExtractedReceiptData {
            fecha: Some("2024-03-05".to_string()),
            kilogramos: Some(4590.0),
            numero_tiquete: Some("1000082175".to_string()),
            valor_unitario: Some(1250.0),
            empresa_nombre: Some("Oleoflores".to_string()),
            raw_text: "...".to_string(),
            confidence: 87.6,
        };
        let draft = ReceiptDraft::from_extraction(&data, &catalog());

        assert_eq!(draft.empresa_id.as_deref(), Some("e-1"));
        assert_eq!(draft.observaciones, "Escaneado automáticamente (88% confianza)");
        assert_eq!(draft.missing_fields(), vec!["compradorId"]);
        assert_eq!(draft.valor_total(), Some(5_737_500.0));
    }

    #[test]
    fn test_empty_extraction_leaves_everything_missing() {
        let draft = ReceiptDraft::from_extraction(&ExtractedReceiptData::default(), &catalog());
        assert_eq!(
            draft.missing_fields(),
            vec![
                "fecha",
                "empresaId",
                "compradorId",
                "numeroTiquete",
                "kilogramos",
                "valorUnitario"
            ]
        );
        assert_eq!(draft.valor_total(), None);
        assert_eq!(draft.observaciones, "Escaneado automáticamente (0% confianza)");
    }

    #[test]
    fn test_confidence_note_rounds_half_up() {
        for (confidence, note) in [(86.5, "87"), (2.5, "3"), (0.5, "1"), (86.49, "86")] {
            let data = ExtractedReceiptData {
                confidence,
                ..Default::default()
            };
            let draft = ReceiptDraft::from_extraction(&data, &[]);
            assert_eq!(
                draft.observaciones,
                format!("Escaneado automáticamente ({note}% confianza)")
            );
        }
    }

    #[test]
    fn test_zero_weight_counts_as_missing() {
        let draft = ReceiptDraft {
            kilogramos: Some(0.0),
            valor_unitario: Some(900.0),
            ..Default::default()
        };
        assert!(draft.missing_fields().contains(&"kilogramos"));
        assert!(!draft.missing_fields().contains(&"valorUnitario"));
        assert_eq!(draft.valor_total(), Some(0.0));
    }

    #[test]
    fn test_empresa_activo_defaults_to_true() {
        let e: Empresa = toml::from_str("id = \"x\"\nnombre = \"X\"").unwrap();
        assert!(e.activo);
    }
}
