use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api::Catalog;
use crate::layout::{OutputLayout, is_safe_file_stem};
use crate::model::{AnnotatedSentenceRow, CsvExportEntry, ManifestoRecord};
use crate::util::{csv_line, write_text_file};

/// Rows of one manifesto, in corpus order.
pub(super) struct Partition<'a> {
    pub manifesto_id: &'a str,
    pub rows: Vec<&'a AnnotatedSentenceRow>,
}

/// Fetches the annotated corpus and writes one CSV per manifesto.
///
/// Every CSV is rewritten on each call. The first write failure aborts the
/// export.
pub(super) fn export_corpus<C: Catalog + ?Sized>(
    catalog: &C,
    records: &[ManifestoRecord],
    layout: &OutputLayout,
) -> Result<Vec<CsvExportEntry>> {
    let rows = catalog
        .corpus(records)
        .context("failed to fetch annotated corpus")?;

    let by_id: HashMap<&str, &ManifestoRecord> = records
        .iter()
        .filter_map(|record| record.id().map(|id| (id, record)))
        .collect();

    let partitions = partition_by_manifesto(&rows);
    let mut exported = Vec::with_capacity(partitions.len());

    for partition in partitions {
        if !is_safe_file_stem(partition.manifesto_id) {
            warn!(
                manifesto_id = %partition.manifesto_id,
                rows = partition.rows.len(),
                "skipping csv for unsafe manifesto_id"
            );
            continue;
        }

        let path = layout.csv_path(partition.manifesto_id);
        info!(
            manifesto_id = %partition.manifesto_id,
            rows = partition.rows.len(),
            path = %path.display(),
            "writing csv"
        );

        let content = render_partition(&partition, by_id.get(partition.manifesto_id).copied());
        write_text_file(&path, &content)
            .with_context(|| format!("failed to export csv for {}", partition.manifesto_id))?;

        exported.push(CsvExportEntry {
            manifesto_id: partition.manifesto_id.to_string(),
            path: path.display().to_string(),
            row_count: partition.rows.len(),
        });
    }

    info!(files = exported.len(), rows = rows.len(), "csv export finished");
    Ok(exported)
}

pub(super) fn partition_by_manifesto(rows: &[AnnotatedSentenceRow]) -> Vec<Partition<'_>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut partitions: Vec<Partition<'_>> = Vec::new();

    for row in rows {
        let slot = *index.entry(row.manifesto_id.as_str()).or_insert_with(|| {
            partitions.push(Partition {
                manifesto_id: row.manifesto_id.as_str(),
                rows: Vec::new(),
            });
            partitions.len() - 1
        });
        partitions[slot].rows.push(row);
    }

    partitions
}

/// Header plus one line per sentence: sentence columns, `pos`, then the
/// record's metadata copied onto every row.
pub(super) fn render_partition(
    partition: &Partition<'_>,
    record: Option<&ManifestoRecord>,
) -> String {
    let mut sentence_columns: Vec<&str> = Vec::new();
    for row in &partition.rows {
        for (column, _) in &row.columns {
            if !sentence_columns.contains(&column.as_str()) {
                sentence_columns.push(column.as_str());
            }
        }
    }

    let metadata = match record {
        Some(record) => record.metadata_columns(),
        None => vec![("manifesto_id".to_string(), partition.manifesto_id.to_string())],
    };

    let mut header: Vec<&str> = sentence_columns.clone();
    header.push("pos");
    header.extend(metadata.iter().map(|(name, _)| name.as_str()));

    let mut lines = Vec::with_capacity(partition.rows.len() + 1);
    lines.push(csv_line(&header));

    for row in &partition.rows {
        let mut cells: Vec<String> = sentence_columns
            .iter()
            .map(|column| {
                row.columns
                    .iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_default()
            })
            .collect();
        cells.push(row.pos.to_string());
        cells.extend(metadata.iter().map(|(_, value)| value.clone()));
        lines.push(csv_line(&cells));
    }

    let mut content = lines.join("\n");
    content.push('\n');
    content
}
