use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::PdfTextArgs;
use crate::util::{discover_files, ensure_directory, write_text_file};

const TEXT_LAYER_TOOLS: [&str; 1] = ["pdftotext"];
const OCR_TOOLS: [&str; 3] = ["pdfinfo", "pdftoppm", "tesseract"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extraction {
    TextLayer,
    Ocr,
}

impl Extraction {
    fn engine(self) -> &'static str {
        match self {
            Self::TextLayer => "pdftotext",
            Self::Ocr => "tesseract",
        }
    }
}

#[derive(Debug, Clone)]
struct OcrSettings {
    lang: String,
    dpi: u32,
}

#[derive(Debug, Default)]
struct PdfTextSummary {
    files: usize,
    written: usize,
    failed: usize,
}

pub fn run(args: PdfTextArgs) -> Result<()> {
    let extractions = available_extractions(!args.skip_text_layer, !args.skip_ocr);
    if extractions.is_empty() {
        bail!(
            "no pdf text extraction available; install pdftotext, or pdfinfo, pdftoppm and tesseract for ocr"
        );
    }

    let settings = OcrSettings {
        lang: args.ocr_lang.clone(),
        dpi: args.ocr_dpi,
    };
    let summary = extract_directory(&args.source_dir, &args.destination, &extractions, &settings)?;

    info!(
        files = summary.files,
        written = summary.written,
        failed = summary.failed,
        "pdf text extraction completed"
    );
    Ok(())
}

fn available_extractions(text_layer: bool, ocr: bool) -> Vec<Extraction> {
    let mut extractions = Vec::new();

    for (wanted, extraction, tools) in [
        (text_layer, Extraction::TextLayer, &TEXT_LAYER_TOOLS[..]),
        (ocr, Extraction::Ocr, &OCR_TOOLS[..]),
    ] {
        if !wanted {
            continue;
        }
        let missing: Vec<&str> = tools
            .iter()
            .copied()
            .filter(|tool| !command_available(tool))
            .collect();
        if missing.is_empty() {
            extractions.push(extraction);
        } else {
            warn!(
                engine = extraction.engine(),
                missing = %missing.join(","),
                "extraction disabled; tools not found"
            );
        }
    }

    extractions
}

/// Writes one text file per pdf and engine. A failure on one file or engine
/// is logged and counted; the loop moves on.
fn extract_directory(
    source_dir: &Path,
    destination: &Path,
    extractions: &[Extraction],
    settings: &OcrSettings,
) -> Result<PdfTextSummary> {
    ensure_directory(destination)?;
    let pdf_paths = discover_files(source_dir, "pdf")?;

    let mut summary = PdfTextSummary {
        files: pdf_paths.len(),
        ..PdfTextSummary::default()
    };

    for (index, pdf_path) in pdf_paths.iter().enumerate() {
        info!(
            source = %pdf_path.display(),
            file = index + 1,
            of = pdf_paths.len(),
            "extracting pdf text"
        );

        for extraction in extractions {
            match extract_one(pdf_path, destination, *extraction, settings) {
                Ok(output) => {
                    summary.written += 1;
                    info!(
                        engine = extraction.engine(),
                        output = %output.display(),
                        "wrote extracted text"
                    );
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        engine = extraction.engine(),
                        source = %pdf_path.display(),
                        error = %format!("{err:#}"),
                        "pdf text extraction failed"
                    );
                }
            }
        }
    }

    Ok(summary)
}

fn extract_one(
    pdf_path: &Path,
    destination: &Path,
    extraction: Extraction,
    settings: &OcrSettings,
) -> Result<PathBuf> {
    let output = output_path(pdf_path, destination, extraction)?;
    let text = match extraction {
        Extraction::TextLayer => extract_text_layer(pdf_path)?,
        Extraction::Ocr => extract_with_ocr(pdf_path, settings)?,
    };
    write_text_file(&output, &text)?;
    Ok(output)
}

/// `<destination>/<stem>_<engine>_extraction.txt`
fn output_path(pdf_path: &Path, destination: &Path, extraction: Extraction) -> Result<PathBuf> {
    let stem = pdf_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("invalid UTF-8 filename: {}", pdf_path.display()))?;
    Ok(destination.join(format!("{stem}_{}_extraction.txt", extraction.engine())))
}

fn extract_text_layer(pdf_path: &Path) -> Result<String> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg("-")
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    Ok(split_pages(&String::from_utf8_lossy(&output.stdout)).join("\n"))
}

/// pdftotext separates pages with form feeds and ends with an empty one.
fn split_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    while pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }

    pages
}

/// OCRs every page. Pages that fail are skipped with a warning; the file
/// fails only when no page could be read.
fn extract_with_ocr(pdf_path: &Path, settings: &OcrSettings) -> Result<String> {
    let page_count = page_count(pdf_path)?;
    let mut pages = Vec::with_capacity(page_count);
    let mut failed_pages = 0_usize;

    for page_number in 1..=page_count {
        info!(page = page_number, of = page_count, "ocr page");
        match ocr_page(pdf_path, page_number, settings) {
            Ok(text) => pages.push(text),
            Err(err) => {
                failed_pages += 1;
                warn!(
                    source = %pdf_path.display(),
                    page = page_number,
                    error = %format!("{err:#}"),
                    "ocr failed for page"
                );
            }
        }
    }

    if page_count > 0 && failed_pages == page_count {
        bail!("ocr failed on all {page_count} pages of {}", pdf_path.display());
    }

    Ok(pages.join("\n"))
}

fn page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .with_context(|| format!("failed to execute pdfinfo for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdfinfo returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    parse_page_count(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("pdfinfo reported no page count for {}", pdf_path.display()))
}

fn parse_page_count(pdfinfo: &str) -> Option<usize> {
    pdfinfo
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|count| count.trim().parse().ok())
}

fn ocr_page(pdf_path: &Path, page_number: usize, settings: &OcrSettings) -> Result<String> {
    let stem = pdf_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("pdf");
    let safe_stem: String = stem
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect();

    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let image_root = std::env::temp_dir().join(format!(
        "manifesto_ocr_{}_{}_{}_{}",
        safe_stem,
        std::process::id(),
        page_number,
        stamp
    ));
    let png_path = PathBuf::from(format!("{}.png", image_root.display()));

    let pdftoppm_output = Command::new("pdftoppm")
        .arg("-r")
        .arg(settings.dpi.to_string())
        .arg("-f")
        .arg(page_number.to_string())
        .arg("-l")
        .arg(page_number.to_string())
        .arg("-singlefile")
        .arg("-png")
        .arg(pdf_path)
        .arg(&image_root)
        .output()
        .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

    if !pdftoppm_output.status.success() {
        let stderr = String::from_utf8_lossy(&pdftoppm_output.stderr);
        bail!(
            "pdftoppm returned non-zero exit status for page {}: {}",
            page_number,
            stderr.trim()
        );
    }
    if !png_path.exists() {
        bail!("pdftoppm did not produce an image for page {page_number}");
    }

    let tesseract_output = Command::new("tesseract")
        .arg(&png_path)
        .arg("stdout")
        .arg("-l")
        .arg(&settings.lang)
        .arg("--oem")
        .arg("3")
        .arg("--psm")
        .arg("6")
        .arg("-c")
        .arg("preserve_interword_spaces=1")
        .output()
        .with_context(|| format!("failed to execute tesseract for {}", png_path.display()));

    let _ = fs::remove_file(&png_path);
    let tesseract_output = tesseract_output?;

    if !tesseract_output.status.success() {
        let stderr = String::from_utf8_lossy(&tesseract_output.stderr);
        bail!(
            "tesseract returned non-zero exit status for page {}: {}",
            page_number,
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&tesseract_output.stdout)
        .replace('\u{0000}', "")
        .trim()
        .to_string())
}

fn command_available(program: &str) -> bool {
    Command::new(program).arg("-v").output().is_ok()
}
