// src/scan.rs

use crate::conditioner::{
    self, ConditionError, ConditionOptions, EncodedImage, OutputFormat, ReceiptImage,
};
use crate::config::Config;
use crate::heuristics::{self, ExtractedReceiptData, ExtractorConfig};
use crate::ocr::{OcrEngine, OcrError};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Condition(#[from] ConditionError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error("image preparation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Everything that shapes one scan apart from the engine itself.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// `None` skips the conditioner and sends the photo as decoded.
    pub conditioning: Option<ConditionOptions>,
    /// Clockwise, applied before conditioning. 0 leaves the photo as is.
    pub rotate_degrees: f64,
    pub output: OutputFormat,
    pub extractor: ExtractorConfig,
    pub low_confidence: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            conditioning: Some(ConditionOptions::default()),
            rotate_degrees: 0.0,
            output: OutputFormat::default(),
            extractor: ExtractorConfig::default(),
            low_confidence: 60.0,
        }
    }
}

impl ScanSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            conditioning: cfg.scan.condition.then(|| cfg.conditioning.clone()),
            rotate_degrees: 0.0,
            output: cfg.output.output_format(),
            extractor: cfg.extraction.clone(),
            low_confidence: cfg.scan.low_confidence,
        }
    }
}

/// Decode, rotate, condition and re-encode a photo for the OCR engine.
pub fn prepare_image(bytes: &[u8], settings: &ScanSettings) -> Result<EncodedImage, ConditionError> {
    let mut image = ReceiptImage::decode(bytes)?;
    debug!(
        width = image.width(),
        height = image.height(),
        "Decoded receipt photo"
    );

    if settings.rotate_degrees != 0.0 {
        image = conditioner::rotate(&image, settings.rotate_degrees);
    }
    if let Some(options) = &settings.conditioning {
        image = conditioner::condition(&image, options)?;
    }

    conditioner::encode(&image, settings.output)
}

/// Full pipeline for one photo already in memory.
pub async fn scan_bytes(
    bytes: Vec<u8>,
    settings: &ScanSettings,
    engine: &dyn OcrEngine,
) -> Result<ExtractedReceiptData, ScanError> {
    let started = Instant::now();

    let prepared = {
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || prepare_image(&bytes, &settings)).await??
    };
    info!(
        bytes = prepared.bytes.len(),
        mime = prepared.mime,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Image prepared"
    );

    let ocr = engine.recognize(&prepared).await?;
    info!(
        engine = engine.name(),
        chars = ocr.text.len(),
        confidence = ocr.confidence,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "OCR finished"
    );

    let data = heuristics::extract_receipt(&ocr.text, ocr.confidence, &settings.extractor);
    let (filled, total) = data.coverage();
    info!(
        filled,
        total,
        fecha = ?data.fecha,
        numero_tiquete = ?data.numero_tiquete,
        kilogramos = ?data.kilogramos,
        valor_unitario = ?data.valor_unitario,
        empresa = ?data.empresa_nombre,
        "Fields extracted"
    );
    if data.confidence < settings.low_confidence {
        warn!(
            confidence = data.confidence,
            threshold = settings.low_confidence,
            "Low OCR confidence, fields need manual review"
        );
    }

    Ok(data)
}

pub async fn scan_file(
    path: &Path,
    settings: &ScanSettings,
    engine: &dyn OcrEngine,
) -> Result<ExtractedReceiptData, ScanError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ScanError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    scan_bytes(bytes, settings, engine).await
}

/// Scan files one after another. A failure is recorded and the batch moves on.
pub async fn scan_batch(
    paths: &[PathBuf],
    settings: &ScanSettings,
    engine: &dyn OcrEngine,
) -> Vec<(PathBuf, Result<ExtractedReceiptData, ScanError>)> {
    let mut results = Vec::with_capacity(paths.len());
    let mut failed = 0usize;

    for path in paths {
        let span = info_span!("scan", file = %path.display());
        let result = scan_file(path, settings, engine).instrument(span).await;
        if let Err(e) = &result {
            warn!(file = %path.display(), error = %e, "Scan failed");
            failed += 1;
        }
        results.push((path.clone(), result));
    }

    info!(total = paths.len(), failed, "Batch complete");
    results
}
