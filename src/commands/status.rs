use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::layout::OutputLayout;
use crate::model::{FetchRunStatus, MetadataManifest};
use crate::util::discover_files;

pub fn run(args: StatusArgs) -> Result<()> {
    let layout = OutputLayout::new(&args.output_root, None, None);
    let metadata_path = layout.metadata_manifest_path();

    info!(output_root = %layout.root.display(), "status requested");

    match latest_run_manifest(&layout.manifest_dir)? {
        Some(run_path) => {
            let raw = fs::read(&run_path)
                .with_context(|| format!("failed to read {}", run_path.display()))?;
            let state: FetchRunStatus = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", run_path.display()))?;
            let counts = state.download_counts.unwrap_or_default();

            info!(
                path = %run_path.display(),
                run_id = %state.run_id.unwrap_or_default(),
                status = %state.status.unwrap_or_default(),
                started_at = %state.started_at.unwrap_or_default(),
                updated_at = %state.updated_at.unwrap_or_default(),
                failed_step = %state.failed_step.unwrap_or_default(),
                failure_reason = %state.failure_reason.unwrap_or_default(),
                records = state.record_count.unwrap_or_default(),
                downloaded = counts.downloaded,
                already_present = counts.already_present,
                ineligible = counts.ineligible,
                failed = counts.failed,
                csv_files = state.csv_file_count.unwrap_or_default(),
                "loaded latest fetch run manifest"
            );
        }
        None => warn!(path = %layout.manifest_dir.display(), "no fetch run manifest found"),
    }

    if metadata_path.exists() {
        let raw = fs::read(&metadata_path)
            .with_context(|| format!("failed to read {}", metadata_path.display()))?;
        let manifest: MetadataManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", metadata_path.display()))?;

        let missing = missing_documents(&manifest, &layout);
        info!(
            generated_at = %manifest.generated_at,
            core_version = %manifest.versions.core,
            metadata_version = %manifest.versions.metadata,
            records = manifest.record_count,
            missing_pdfs = missing.len(),
            "loaded metadata manifest"
        );
        if !missing.is_empty() {
            warn!(manifesto_ids = %missing.join(","), "documents without a local pdf");
        }
    } else {
        warn!(path = %metadata_path.display(), "metadata manifest missing");
    }

    for (dir, extension) in [(&layout.pdf_dir, "pdf"), (&layout.csv_dir, "csv")] {
        if dir.is_dir() {
            let count = discover_files(dir, extension)?.len();
            info!(path = %dir.display(), files = count, "{extension} folder");
        } else {
            warn!(path = %dir.display(), "{extension} folder missing");
        }
    }

    Ok(())
}

fn latest_run_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.is_dir() {
        return Ok(None);
    }

    Ok(discover_files(manifest_dir, "json")?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("fetch_run_"))
                .unwrap_or(false)
        })
        .max())
}

/// Keyed records with a download URL whose PDF is not on disk.
fn missing_documents(manifest: &MetadataManifest, layout: &OutputLayout) -> Vec<String> {
    manifest
        .records
        .iter()
        .filter(|record| record.document_url().is_some())
        .filter_map(|record| record.id())
        .filter(|id| !layout.pdf_path(id).exists())
        .map(ToOwned::to_owned)
        .collect()
}
