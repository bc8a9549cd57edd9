use crate::conditioner::{ConditionOptions, OutputFormat};
use crate::draft::Empresa;
use crate::heuristics::ExtractorConfig;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub conditioning: ConditionOptions,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub ocr: OcrSection,
    #[serde(default)]
    pub extraction: ExtractorConfig,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub scan: ScanSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Jpeg,
    Png,
}

#[derive(Debug, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_encoding")]
    pub format: ImageEncoding,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_encoding() -> ImageEncoding {
    ImageEncoding::Jpeg
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: default_encoding(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl OutputSection {
    pub fn output_format(&self) -> OutputFormat {
        match self.format {
            ImageEncoding::Jpeg => OutputFormat::Jpeg {
                quality: self.jpeg_quality,
            },
            ImageEncoding::Png => OutputFormat::Png,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    /// Local `tesseract` command-line program.
    Tesseract,
    /// HTTP service answering `{ "text": ..., "confidence": ... }`.
    Remote,
}

#[derive(Debug, Deserialize)]
pub struct OcrSection {
    #[serde(default = "default_backend")]
    pub backend: OcrBackend,
    /// Tesseract-style language id, e.g. `spa` or `spa+eng`.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub tesseract: TesseractSection,
    #[serde(default)]
    pub remote: RemoteSection,
}

fn default_backend() -> OcrBackend {
    OcrBackend::Tesseract
}

fn default_language() -> String {
    "spa".to_string()
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            language: default_language(),
            tesseract: TesseractSection::default(),
            remote: RemoteSection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TesseractSection {
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Page segmentation mode; 3 keeps the whole receipt layout.
    #[serde(default = "default_psm")]
    pub psm: u8,
    #[serde(default = "default_char_whitelist")]
    pub char_whitelist: Option<String>,
    #[serde(default = "default_true")]
    pub preserve_interword_spaces: bool,
}

fn default_binary() -> String {
    "tesseract".to_string()
}

fn default_psm() -> u8 {
    3
}

fn default_char_whitelist() -> Option<String> {
    Some(
        "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyzáéíóúÁÉÍÓÚñÑ:.-/, $"
            .to_string(),
    )
}

fn default_true() -> bool {
    true
}

impl Default for TesseractSection {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            psm: default_psm(),
            char_whitelist: default_char_whitelist(),
            preserve_interword_spaces: default_true(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_remote_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_remote_url() -> String {
    "http://localhost:8884/ocr".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            url: default_remote_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Companies the scanner may pre-select. Stands in for the catalog store.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSection {
    #[serde(default)]
    pub empresas: Vec<Empresa>,
}

#[derive(Debug, Deserialize)]
pub struct ScanSection {
    /// Run the image conditioner before OCR.
    #[serde(default = "default_true")]
    pub condition: bool,
    /// Below this confidence a scan is logged as needing review.
    #[serde(default = "default_low_confidence")]
    pub low_confidence: f64,
}

fn default_low_confidence() -> f64 {
    60.0
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            condition: default_true(),
            low_confidence: default_low_confidence(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like `load`, but a missing file means built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        info!(path = %path.display(), "Loading config");
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.conditioning, ConditionOptions::default());
        assert_eq!(cfg.output.output_format(), OutputFormat::Jpeg { quality: 90 });
        assert_eq!(cfg.ocr.backend, OcrBackend::Tesseract);
        assert_eq!(cfg.ocr.language, "spa");
        assert_eq!(cfg.ocr.tesseract.psm, 3);
        assert_eq!(cfg.extraction, ExtractorConfig::default());
        assert!(cfg.catalog.empresas.is_empty());
        assert!(cfg.scan.condition);
        assert_eq!(cfg.scan.low_confidence, 60.0);
    }

    #[test]
    fn test_overrides() {
        let cfg: Config = toml::from_str(
            r#"
            [conditioning]
            resize_target_width = 2000
            adaptive_threshold = true
            auto_crop = true

            [output]
            format = "png"

            [ocr]
            backend = "remote"
            language = "spa+eng"

            [ocr.remote]
            url = "http://ocr.internal:9000/recognize"
            timeout_secs = 30

            [[extraction.companies]]
            pattern = "PALMAS"
            name = "Palmas del Sur"

            [[catalog.empresas]]
            id = "e-1"
            nombre = "Palmas del Sur S.A."

            [scan]
            low_confidence = 75.0
            "#,
        )
        .unwrap();

        assert_eq!(cfg.conditioning.resize_target_width, Some(2000));
        assert!(cfg.conditioning.adaptive_threshold);
        assert!(cfg.conditioning.auto_crop);
        // Unset keys keep their defaults.
        assert!(cfg.conditioning.sharpen);
        assert_eq!(cfg.conditioning.contrast_percent, 160.0);

        assert_eq!(cfg.output.output_format(), OutputFormat::Png);
        assert_eq!(cfg.ocr.backend, OcrBackend::Remote);
        assert_eq!(cfg.ocr.language, "spa+eng");
        assert_eq!(cfg.ocr.remote.timeout_secs, 30);
        assert_eq!(cfg.extraction.companies.len(), 1);
        assert_eq!(cfg.extraction.companies[0].name, "Palmas del Sur");
        assert_eq!(cfg.catalog.empresas[0].id, "e-1");
        assert!(cfg.catalog.empresas[0].activo);
        assert_eq!(cfg.scan.low_confidence, 75.0);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[ocr]\nbackend = \"vision\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiquete-scan.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[ocr.tesseract]\nbinary = \"/opt/tesseract/bin/tesseract\"").unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.ocr.tesseract.binary, "/opt/tesseract/bin/tesseract");

        let missing = Config::load_or_default(dir.path().join("nope.toml")).unwrap();
        assert_eq!(missing.ocr.tesseract.binary, "tesseract");
        assert!(Config::load(dir.path().join("nope.toml")).is_err());
    }
}
