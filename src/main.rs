use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tiquete_scan::conditioner::OutputFormat;
use tiquete_scan::config::Config;
use tiquete_scan::draft::ReceiptDraft;
use tiquete_scan::heuristics;
use tiquete_scan::ocr;
use tiquete_scan::scan::{self, ScanSettings};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tiquete-scan")]
#[command(about = "Read fruit-purchase receipts (tiquetes) from photos")]
struct Cli {
    /// TOML config; built-in defaults are used when it does not exist
    #[arg(long, global = true, default_value = "tiquete-scan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Condition, OCR and extract fields from receipt photos
    Scan {
        /// Clockwise rotation in degrees applied before conditioning
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        rotate: f64,
        /// Send photos to OCR without conditioning
        #[arg(long)]
        raw: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Write the conditioned image without running OCR
    Condition {
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        rotate: f64,
        input: PathBuf,
        output: PathBuf,
    },
    /// Extract fields from OCR text (stdin when no file is given)
    Extract {
        #[arg(long, default_value_t = 100.0)]
        confidence: f64,
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries the JSON results.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Scan { rotate, raw, files } => run_scan(&cfg, rotate, raw, &files).await,
        Command::Condition {
            rotate,
            input,
            output,
        } => run_condition(&cfg, rotate, &input, &output).await,
        Command::Extract { confidence, file } => run_extract(&cfg, confidence, file.as_deref()).await,
    }
}

async fn run_scan(
    cfg: &Config,
    rotate: f64,
    raw: bool,
    files: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = ocr::engine_from_config(&cfg.ocr)?;
    let mut settings = ScanSettings::from_config(cfg);
    settings.rotate_degrees = rotate;
    if raw {
        settings.conditioning = None;
    }

    let results = scan::scan_batch(files, &settings, engine.as_ref()).await;

    let report: Vec<_> = results
        .into_iter()
        .map(|(path, result)| match result {
            Ok(data) => {
                let draft = ReceiptDraft::from_extraction(&data, &cfg.catalog.empresas);
                json!({
                    "file": path.display().to_string(),
                    "data": data,
                    "draft": draft,
                    "missing": draft.missing_fields(),
                    "valorTotal": draft.valor_total(),
                })
            }
            Err(e) => json!({
                "file": path.display().to_string(),
                "error": e.to_string(),
            }),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_condition(
    cfg: &Config,
    rotate: f64,
    input: &Path,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = ScanSettings::from_config(cfg);
    settings.rotate_degrees = rotate;
    settings.conditioning = Some(cfg.conditioning.clone());
    let wants_png = output
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if wants_png {
        settings.output = OutputFormat::Png;
    }

    let bytes = tokio::fs::read(input).await?;
    let prepared = tokio::task::spawn_blocking(move || scan::prepare_image(&bytes, &settings)).await??;
    tokio::fs::write(output, &prepared.bytes).await?;

    info!(
        input = %input.display(),
        output = %output.display(),
        bytes = prepared.bytes.len(),
        mime = prepared.mime,
        "Conditioned image written"
    );
    Ok(())
}

async fn run_extract(
    cfg: &Config,
    confidence: f64,
    file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = match file {
        Some(path) => tokio::fs::read(path).await?,
        None => {
            let mut bytes = Vec::new();
            tokio::io::stdin().read_to_end(&mut bytes).await?;
            bytes
        }
    };
    let text = ocr_text(&bytes);

    let data = heuristics::extract_receipt(&text, confidence, &cfg.extraction);
    let (filled, total) = data.coverage();
    info!(filled, total, "Fields extracted");

    let draft = ReceiptDraft::from_extraction(&data, &cfg.catalog.empresas);
    let report = json!({
        "data": data,
        "draft": draft,
        "missing": draft.missing_fields(),
        "valorTotal": draft.valor_total(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// OCR dumps are not always valid UTF-8; bad bytes become U+FFFD.
fn ocr_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiquete_scan::heuristics::ExtractorConfig;

    #[test]
    fn test_non_utf8_text_still_extracts() {
        // Latin-1 "PESO NETO: 4.590 KG\nGUÍA 1000082175"
        let mut bytes = b"PESO NETO: 4.590 KG\nGU".to_vec();
        bytes.push(0xCD);
        bytes.extend_from_slice(b"A 1000082175");

        let text = ocr_text(&bytes);
        assert!(text.contains('\u{fffd}'));

        let data = heuristics::extract_receipt(&text, 80.0, &ExtractorConfig::default());
        assert_eq!(data.kilogramos, Some(4590.0));
        assert_eq!(data.numero_tiquete.as_deref(), Some("1000082175"));
    }

    #[test]
    fn test_cli_parses_negative_rotation() {
        let cli = Cli::try_parse_from(["tiquete-scan", "scan", "--rotate", "-90", "a.jpg"]).unwrap();
        match cli.command {
            Command::Scan { rotate, raw, files } => {
                assert_eq!(rotate, -90.0);
                assert!(!raw);
                assert_eq!(files, vec![PathBuf::from("a.jpg")]);
            }
            _ => panic!("expected scan"),
        }
    }
}
