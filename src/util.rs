use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `20261019T120000Z`, used in run ids and report file names.
pub fn run_stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

/// Lowercase hex SHA-256 of a file on disk.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {} for hashing", path.display()))?;

    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::new(file), &mut hasher)
        .with_context(|| format!("failed to hash {}", path.display()))?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Pretty JSON plus a trailing newline; parent folders are created.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let file = File::create(path)
        .with_context(|| format!("failed to create manifest {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to serialize manifest {}", path.display()))?;
    writeln!(writer)
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write manifest {}", path.display()))
}

pub fn write_text_file(path: &Path, content: &str) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to create file: {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write file: {}", path.display()))?;
    Ok(())
}

/// Regular files directly inside `dir` whose extension matches, sorted by path.
pub fn discover_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

pub fn csv_line<S: AsRef<str>>(cells: &[S]) -> String {
    cells
        .iter()
        .map(|cell| escape_csv_cell(cell.as_ref()))
        .collect::<Vec<String>>()
        .join(",")
}

pub fn escape_csv_cell(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Parses comma-separated text with `"`-quoted cells into rows.
///
/// Quoted cells may contain commas, doubled quotes, and line breaks. Both
/// `\n` and `\r\n` end a record.
pub fn parse_csv(content: &str) -> Result<Vec<Vec<String>>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut cell_was_quoted = false;
    let mut chars = content.chars().peekable();

    while let Some(character) = chars.next() {
        if in_quotes {
            match character {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                other => cell.push(other),
            }
            continue;
        }

        match character {
            '"' if cell.is_empty() && !cell_was_quoted => {
                in_quotes = true;
                cell_was_quoted = true;
            }
            ',' => {
                row.push(std::mem::take(&mut cell));
                cell_was_quoted = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
                cell_was_quoted = false;
            }
            other => cell.push(other),
        }
    }

    if in_quotes {
        bail!("unterminated quoted cell in csv input");
    }

    if !cell.is_empty() || cell_was_quoted || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }

    Ok(rows)
}
