use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use super::{DownloadSummary, download_documents, export_corpus, fetch_metadata};
use crate::api::{Catalog, DocumentSource, HttpDocumentSource};
use crate::cli::FetchArgs;
use crate::commands::{connect, request_timeout};
use crate::layout::OutputLayout;
use crate::model::{
    CsvExportEntry, DatasetVersions, FetchPaths, FetchRunManifest, ManifestoRecord,
    MetadataManifest,
};
use crate::util::{now_utc_string, run_stamp, write_json_pretty};

pub(super) struct StageOptions<'a> {
    pub base_origin: &'a str,
    pub skip_pdfs: bool,
    pub skip_csvs: bool,
}

pub(super) struct StageResults {
    pub downloads: Option<DownloadSummary>,
    pub exports: Result<Vec<CsvExportEntry>>,
}

pub fn run(args: FetchArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("fetch-{}", run_stamp(started_ts));

    let layout = OutputLayout::new(&args.output_root, args.pdf_dir.clone(), args.csv_dir.clone());
    layout.prepare()?;
    let report_path = args.report_path.clone().unwrap_or_else(|| {
        layout
            .manifest_dir
            .join(format!("fetch_run_{}.json", run_stamp(started_ts)))
    });

    info!(output_root = %layout.root.display(), run_id = %run_id, "starting fetch");

    let mut client = connect(&args.api)?;
    let versions = client
        .resolve_versions(args.core_version.clone(), args.metadata_version.clone())
        .context("failed to resolve dataset versions")?;

    let records = fetch_metadata(&client, &args.parties)?;

    let metadata_manifest = MetadataManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        versions: versions.clone(),
        parties: args.parties.clone(),
        record_count: records.len(),
        records: records.clone(),
    };
    let metadata_manifest_path = layout.metadata_manifest_path();
    write_json_pretty(&metadata_manifest_path, &metadata_manifest)?;
    info!(path = %metadata_manifest_path.display(), "wrote metadata manifest");

    let documents = HttpDocumentSource::new(request_timeout(&args.api))
        .context("failed to build document HTTP client")?;
    let options = StageOptions {
        base_origin: &args.base_origin,
        skip_pdfs: args.skip_pdfs,
        skip_csvs: args.skip_csvs,
    };
    let results = execute_stages(&client, &documents, &layout, &records, &options);

    let manifest = build_run_manifest(&args, run_id, started_at, versions, &layout, &records, &results);
    write_json_pretty(&report_path, &manifest)?;
    info!(path = %report_path.display(), status = %manifest.status, "wrote fetch run manifest");

    results.exports?;

    let failed = manifest
        .download_counts
        .map(|counts| counts.failed)
        .unwrap_or_default();
    if failed > 0 {
        warn!(failed, "some documents could not be downloaded");
        if args.strict {
            bail!("{failed} document download(s) failed");
        }
    }

    info!(records = records.len(), "fetch completed");
    Ok(())
}

/// Runs the download stage then the export stage over one metadata table.
///
/// Download failures stay inside the summary; an export failure is returned
/// in `exports` so the caller can still record the download results.
pub(super) fn execute_stages<C, D>(
    catalog: &C,
    documents: &D,
    layout: &OutputLayout,
    records: &[ManifestoRecord],
    options: &StageOptions<'_>,
) -> StageResults
where
    C: Catalog + ?Sized,
    D: DocumentSource + ?Sized,
{
    let downloads = if options.skip_pdfs {
        info!("skipping document downloads");
        None
    } else {
        Some(download_documents(documents, records, layout, options.base_origin))
    };

    let exports = if options.skip_csvs {
        info!("skipping csv export");
        Ok(Vec::new())
    } else {
        export_corpus(catalog, records, layout)
    };

    StageResults { downloads, exports }
}

fn build_run_manifest(
    args: &FetchArgs,
    run_id: String,
    started_at: String,
    versions: DatasetVersions,
    layout: &OutputLayout,
    records: &[ManifestoRecord],
    results: &StageResults,
) -> FetchRunManifest {
    let mut completed_steps = vec!["metadata".to_string()];
    if results.downloads.is_some() {
        completed_steps.push("download".to_string());
    }

    let (status, failed_step, failure_reason, csv_files) = match &results.exports {
        Ok(files) => {
            if !args.skip_csvs {
                completed_steps.push("export".to_string());
            }
            ("completed", None, None, files.clone())
        }
        Err(err) => (
            "failed",
            Some("export".to_string()),
            Some(format!("{err:#}")),
            Vec::new(),
        ),
    };

    FetchRunManifest {
        manifest_version: 1,
        run_id,
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        completed_steps,
        failed_step,
        failure_reason,
        command: render_fetch_command(args),
        api_url: args.api.api_url.clone(),
        versions,
        parties: args.parties.clone(),
        paths: FetchPaths {
            output_root: layout.root.display().to_string(),
            pdf_dir: layout.pdf_dir.display().to_string(),
            csv_dir: layout.csv_dir.display().to_string(),
            metadata_manifest_path: layout.metadata_manifest_path().display().to_string(),
        },
        record_count: records.len(),
        download_counts: results.downloads.as_ref().map(DownloadSummary::counts),
        downloads: results
            .downloads
            .as_ref()
            .map(|summary| summary.entries.clone())
            .unwrap_or_default(),
        csv_file_count: csv_files.len(),
        csv_files,
    }
}

fn render_fetch_command(args: &FetchArgs) -> String {
    let mut parts = vec![
        "manifesto-fetch".to_string(),
        "fetch".to_string(),
        "--output-root".to_string(),
        args.output_root.display().to_string(),
    ];

    for party in &args.parties {
        parts.push("--party".to_string());
        parts.push(party.to_string());
    }
    if let Some(core) = &args.core_version {
        parts.push("--core-version".to_string());
        parts.push(core.clone());
    }
    if let Some(metadata) = &args.metadata_version {
        parts.push("--metadata-version".to_string());
        parts.push(metadata.clone());
    }
    if args.skip_pdfs {
        parts.push("--skip-pdfs".to_string());
    }
    if args.skip_csvs {
        parts.push("--skip-csvs".to_string());
    }
    if args.strict {
        parts.push("--strict".to_string());
    }

    parts.join(" ")
}
