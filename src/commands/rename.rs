use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

use crate::cli::RenameArgs;
use crate::layout::OutputLayout;
use crate::model::MetadataManifest;
use crate::util::{csv_line, discover_files, ensure_directory, parse_csv, write_text_file};

struct RenamePatterns {
    coded: Regex,
    additional: Regex,
}

impl RenamePatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            coded: Regex::new(r"^(\d+)_(\d{6})").context("failed to compile coded filename regex")?,
            additional: Regex::new(r"^manifesto_(\d{6})[_-](.+)")
                .context("failed to compile additional filename regex")?,
        })
    }
}

pub fn run(args: RenameArgs) -> Result<()> {
    let layout = OutputLayout::new(&args.output_root, args.pdf_dir.clone(), args.csv_dir.clone());
    let patterns = RenamePatterns::new()?;

    let party_names = match &args.party_codes {
        Some(path) => load_party_codes(path)?,
        None => load_party_names_from_metadata(&layout.metadata_manifest_path())?,
    };
    info!(parties = party_names.len(), "loaded party names");

    ensure_directory(&args.destination)?;

    let mut log: Vec<(String, String)> = Vec::new();
    for (dir, extension) in [(&layout.pdf_dir, "pdf"), (&layout.csv_dir, "csv")] {
        if !dir.is_dir() {
            warn!(path = %dir.display(), "source folder missing; skipping");
            continue;
        }
        for path in discover_files(dir, extension)? {
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Some(new_name) = coded_file_name(stem, extension, &party_names, &patterns) {
                copy_renamed(&path, &args.destination, new_name, &mut log)?;
            }
        }
    }

    if let Some(dir) = &args.additional_dir {
        for path in discover_files(dir, "pdf")? {
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Some(new_name) = additional_file_name(stem, &patterns) {
                copy_renamed(&path, &args.destination, new_name, &mut log)?;
            }
        }
    }

    let log_path = args.destination.join("renaming_log.csv");
    let mut lines = vec![csv_line(&["old_name", "new_name"])];
    lines.extend(log.iter().map(|(old, new)| csv_line(&[old.as_str(), new.as_str()])));
    write_text_file(&log_path, &format!("{}\n", lines.join("\n")))?;

    info!(files = log.len(), log = %log_path.display(), "renaming complete");
    Ok(())
}

fn copy_renamed(
    source: &Path,
    destination: &Path,
    new_name: String,
    log: &mut Vec<(String, String)>,
) -> Result<()> {
    let target = destination.join(&new_name);
    fs::copy(source, &target).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;

    let old_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    log.push((old_name, new_name));
    Ok(())
}

/// `51320_198706` becomes `1987-06-<party slug>`.
fn coded_file_name(
    stem: &str,
    extension: &str,
    party_names: &HashMap<String, String>,
    patterns: &RenamePatterns,
) -> Option<String> {
    let captures = patterns.coded.captures(stem)?;
    let code = captures.get(1)?.as_str();
    let yyyymm = captures.get(2)?.as_str();
    let (year, month) = yyyymm.split_at(4);

    let party = party_names
        .get(code)
        .cloned()
        .unwrap_or_else(|| code.to_string());
    Some(format!("{year}-{month}-{party}.{extension}"))
}

fn additional_file_name(stem: &str, patterns: &RenamePatterns) -> Option<String> {
    let lowered = stem.to_lowercase();

    if let Some(captures) = patterns.additional.captures(&lowered) {
        let (year, month) = captures.get(1)?.as_str().split_at(4);
        let raw_party = captures.get(2)?.as_str();
        let party = match raw_party {
            "leave" => "leave".to_string(),
            "remain" => "remain".to_string(),
            "reform" => "reform_uk".to_string(),
            other => other.replace([' ', '-'], "_"),
        };
        return Some(format!("{year}-{month}-{party}.pdf"));
    }

    if lowered.contains("leave") {
        Some("2016-06-leave.pdf".to_string())
    } else if lowered.contains("remain") {
        Some("2016-06-remain.pdf".to_string())
    } else {
        None
    }
}

fn party_slug(name: &str) -> String {
    name.to_lowercase().replace([' ', '-'], "_")
}

fn load_party_codes(path: &Path) -> Result<HashMap<String, String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let rows = parse_csv(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    party_codes_from_rows(&rows).with_context(|| format!("invalid party codes in {}", path.display()))
}

fn party_codes_from_rows(rows: &[Vec<String>]) -> Result<HashMap<String, String>> {
    let header = rows.first().context("party code table is empty")?;
    let position = |name: &str| {
        header
            .iter()
            .position(|cell| cell.trim() == name)
            .with_context(|| format!("missing `{name}` column"))
    };
    let party_col = position("party")?;
    let name_col = position("partyname")?;

    let mut names = HashMap::new();
    for row in rows.iter().skip(1) {
        let (Some(code), Some(name)) = (row.get(party_col), row.get(name_col)) else {
            continue;
        };
        if code.trim().is_empty() || name.trim().is_empty() {
            continue;
        }
        names.insert(code.trim().to_string(), party_slug(name.trim()));
    }
    Ok(names)
}

fn load_party_names_from_metadata(path: &Path) -> Result<HashMap<String, String>> {
    let raw = fs::read(path).with_context(|| {
        format!(
            "failed to read {}; run `fetch` first or pass --party-codes",
            path.display()
        )
    })?;
    let manifest: MetadataManifest = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    Ok(manifest
        .records
        .iter()
        .filter_map(|record| {
            let party = record.party?;
            record
                .partyname
                .as_deref()
                .map(|name| (party.to_string(), party_slug(name)))
        })
        .collect())
}
