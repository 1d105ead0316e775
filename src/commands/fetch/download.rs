use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::resolve_document_url;
use crate::api::DocumentSource;
use crate::layout::{OutputLayout, is_safe_file_stem};
use crate::model::{DownloadCounts, DownloadEntry, DownloadOutcome, ManifestoRecord};
use crate::util::sha256_file;

#[derive(Debug, Default)]
pub(super) struct DownloadSummary {
    pub entries: Vec<DownloadEntry>,
}

impl DownloadSummary {
    pub fn counts(&self) -> DownloadCounts {
        let mut counts = DownloadCounts::default();
        for entry in &self.entries {
            match entry.outcome {
                DownloadOutcome::Downloaded { .. } => counts.downloaded += 1,
                DownloadOutcome::AlreadyPresent { .. } => counts.already_present += 1,
                DownloadOutcome::Ineligible { .. } => counts.ineligible += 1,
                DownloadOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }
}

/// Downloads the original document of every eligible record.
///
/// An existing target file counts as done whatever its content. Failures
/// never abort the loop; they are returned as `Failed` outcomes.
pub(super) fn download_documents<D: DocumentSource + ?Sized>(
    source: &D,
    records: &[ManifestoRecord],
    layout: &OutputLayout,
    base_origin: &str,
) -> DownloadSummary {
    let mut summary = DownloadSummary::default();

    for record in records {
        let outcome = download_record(source, record, layout, base_origin);
        if let DownloadOutcome::Failed { url, error, .. } = &outcome {
            warn!(
                manifesto_id = record.id().unwrap_or_default(),
                url = %url,
                error = %error,
                "document download failed"
            );
        }
        summary.entries.push(DownloadEntry {
            manifesto_id: record.id().map(ToOwned::to_owned),
            outcome,
        });
    }

    let counts = summary.counts();
    info!(
        downloaded = counts.downloaded,
        already_present = counts.already_present,
        ineligible = counts.ineligible,
        failed = counts.failed,
        "document downloads finished"
    );

    summary
}

fn download_record<D: DocumentSource + ?Sized>(
    source: &D,
    record: &ManifestoRecord,
    layout: &OutputLayout,
    base_origin: &str,
) -> DownloadOutcome {
    let Some(manifesto_id) = record.id() else {
        return DownloadOutcome::Ineligible {
            reason: "missing manifesto_id".to_string(),
        };
    };
    if !is_safe_file_stem(manifesto_id) {
        return DownloadOutcome::Ineligible {
            reason: "unsafe manifesto_id".to_string(),
        };
    }
    let Some(raw_url) = record.document_url() else {
        return DownloadOutcome::Ineligible {
            reason: "missing url_original".to_string(),
        };
    };

    let target = layout.pdf_path(manifesto_id);
    let path = target.display().to_string();
    if target.exists() {
        return DownloadOutcome::AlreadyPresent { path };
    }

    let url = resolve_document_url(raw_url.trim(), base_origin);
    info!(manifesto_id = %manifesto_id, url = %url, "downloading document");

    match fetch_to_file(source, &url, &target) {
        Ok((bytes, sha256)) => DownloadOutcome::Downloaded {
            path,
            url,
            bytes,
            sha256,
        },
        Err(err) => DownloadOutcome::Failed {
            path,
            url,
            error: format!("{err:#}"),
        },
    }
}

/// Streams the body into `target`. The file is created only once the
/// response status is known to be a success; an interrupted stream leaves
/// the partial file behind.
fn fetch_to_file<D: DocumentSource + ?Sized>(
    source: &D,
    url: &str,
    target: &Path,
) -> Result<(u64, String)> {
    let mut body = source
        .open(url)
        .with_context(|| format!("failed to request {url}"))?;

    let mut file = File::create(target)
        .with_context(|| format!("failed to create {}", target.display()))?;
    let bytes = io::copy(&mut body, &mut file)
        .with_context(|| format!("failed to write {}", target.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", target.display()))?;

    let sha256 = sha256_file(target)?;
    Ok((bytes, sha256))
}
