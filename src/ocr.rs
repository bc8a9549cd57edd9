// src/ocr.rs

use crate::conditioner::EncodedImage;
use crate::config::{OcrBackend, OcrSection, TesseractSection};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Recognised text and the engine's confidence in it (0-100).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to start `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("OCR process I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("`{binary}` exited with {status}: {stderr}")]
    Failed {
        binary: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("invalid OCR service url `{url}`: {reason}")]
    BadUrl { url: String, reason: String },
    #[error("OCR request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OCR service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Something that turns an encoded receipt photo into text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &EncodedImage) -> Result<OcrOutput, OcrError>;

    fn name(&self) -> &'static str;
}

/// Pick the engine named in the `[ocr]` config section.
pub fn engine_from_config(ocr: &OcrSection) -> Result<Box<dyn OcrEngine>, OcrError> {
    match ocr.backend {
        OcrBackend::Tesseract => {
            info!(
                binary = %ocr.tesseract.binary,
                language = %ocr.language,
                psm = ocr.tesseract.psm,
                "Using tesseract OCR backend"
            );
            Ok(Box::new(TesseractEngine::new(&ocr.language, &ocr.tesseract)))
        }
        OcrBackend::Remote => {
            info!(
                url = %ocr.remote.url,
                language = %ocr.language,
                "Using remote OCR backend"
            );
            Ok(Box::new(RemoteEngine::new(
                &ocr.remote.url,
                &ocr.language,
                Duration::from_secs(ocr.remote.timeout_secs),
            )?))
        }
    }
}

/// Runs the `tesseract` CLI, feeding the image on stdin and reading TSV.
pub struct TesseractEngine {
    binary: String,
    language: String,
    psm: u8,
    char_whitelist: Option<String>,
    preserve_interword_spaces: bool,
}

impl TesseractEngine {
    pub fn new(language: &str, section: &TesseractSection) -> Self {
        Self {
            binary: section.binary.clone(),
            language: language.to_string(),
            psm: section.psm,
            char_whitelist: section.char_whitelist.clone(),
            preserve_interword_spaces: section.preserve_interword_spaces,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            self.psm.to_string(),
        ];
        if self.preserve_interword_spaces {
            args.push("-c".to_string());
            args.push("preserve_interword_spaces=1".to_string());
        }
        if let Some(list) = &self.char_whitelist {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={list}"));
        }
        args.push("tsv".to_string());
        args
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image: &EncodedImage) -> Result<OcrOutput, OcrError> {
        let mut child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OcrError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        // Dropping stdin closes it so tesseract sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&image.bytes).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                binary: self.binary.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let result = parse_tsv(&tsv);
        debug!(
            chars = result.text.len(),
            confidence = result.confidence,
            "tesseract finished"
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "tesseract"
    }
}

/// Rebuild text from tesseract's TSV word rows.
///
/// Words sharing a (page, block, paragraph, line) key are joined by a space
/// and each key becomes one output line. Confidence is the mean over words
/// with a non-negative score; no words means 0.
fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<[&str; 4]> = None;
    let mut conf_sum = 0.0;
    let mut conf_count = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let key = [cols[1], cols[2], cols[3], cols[4]];
        match lines.last_mut() {
            Some(line) if current_key == Some(key) => {
                line.push(' ');
                line.push_str(word);
            }
            _ => {
                lines.push(word.to_string());
                current_key = Some(key);
            }
        }

        if let Ok(conf) = cols[10].trim().parse::<f64>() {
            if conf >= 0.0 {
                conf_sum += conf;
                conf_count += 1;
            }
        }
    }

    let confidence = if conf_count == 0 {
        0.0
    } else {
        conf_sum / conf_count as f64
    };

    OcrOutput {
        text: lines.join("\n"),
        confidence,
    }
}

/// POSTs the image to an HTTP OCR service.
///
/// The body is the raw image with its MIME type; the language goes in the
/// `lang` query parameter. The service answers `{"text", "confidence"}`.
pub struct RemoteEngine {
    client: Client,
    url: Url,
}

impl RemoteEngine {
    pub fn new(url: &str, language: &str, timeout: Duration) -> Result<Self, OcrError> {
        let url = Url::parse_with_params(url, &[("lang", language)]).map_err(|e| {
            OcrError::BadUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl OcrEngine for RemoteEngine {
    async fn recognize(&self, image: &EncodedImage) -> Result<OcrOutput, OcrError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, image.mime)
            .body(image.bytes.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Status { status, body });
        }

        Ok(response.json::<OcrOutput>().await?)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
