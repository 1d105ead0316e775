use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::ExportTextArgs;
use crate::util::{discover_files, ensure_directory, parse_csv, write_text_file};

pub fn run(args: ExportTextArgs) -> Result<()> {
    ensure_directory(&args.destination)?;
    let csv_paths = discover_files(&args.source_dir, "csv")?;

    let mut processed = 0_usize;
    let mut failed = 0_usize;
    for path in &csv_paths {
        match export_file(path, &args.destination) {
            Ok(output) => {
                processed += 1;
                info!(source = %path.display(), output = %output.display(), "exported text");
            }
            Err(err) => {
                failed += 1;
                warn!(source = %path.display(), error = %format!("{err:#}"), "text export failed");
            }
        }
    }

    info!(processed, failed, "text export completed");
    Ok(())
}

fn export_file(path: &Path, destination: &Path) -> Result<PathBuf> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let rows = parse_csv(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    let lines = text_column_values(&rows)?;

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
    let output = destination.join(format!("{stem}_from_csv.txt"));
    write_text_file(&output, &lines.join("\n"))?;

    Ok(output)
}

/// Non-empty cells of the `text` column, in row order.
fn text_column_values(rows: &[Vec<String>]) -> Result<Vec<&str>> {
    let Some(header) = rows.first() else {
        bail!("csv has no header row");
    };
    let Some(text_col) = header.iter().position(|cell| cell == "text") else {
        bail!("csv has no `text` column");
    };

    Ok(rows
        .iter()
        .skip(1)
        .filter_map(|row| row.get(text_col))
        .map(String::as_str)
        .filter(|text| !text.is_empty())
        .collect())
}
