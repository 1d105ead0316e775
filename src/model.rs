use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One document entry of the Manifesto Project metadata catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestoRecord {
    pub manifesto_id: Option<String>,
    pub party: Option<u32>,
    pub date: Option<u32>,
    pub partyname: Option<String>,
    pub url_original: Option<String>,
    pub language: Option<String>,
    pub source: Option<String>,
    pub title: Option<String>,
    pub annotations: Option<bool>,
    pub has_eu_code: Option<bool>,
    pub is_primary_doc: Option<bool>,
    pub may_contradict_core_dataset: Option<bool>,
    pub md5sum_text: Option<String>,
    pub md5sum_original: Option<String>,
    pub handbook: Option<String>,
    pub is_copy_of: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ManifestoRecord {
    /// The manifesto identifier, if present and non-blank.
    pub fn id(&self) -> Option<&str> {
        non_blank(self.manifesto_id.as_deref())
    }

    /// The source document URL, if present and non-blank.
    pub fn document_url(&self) -> Option<&str> {
        non_blank(self.url_original.as_deref())
    }

    /// Metadata columns attached to every exported sentence row.
    pub fn metadata_columns(&self) -> Vec<(String, String)> {
        let mut columns = vec![
            column("manifesto_id", self.manifesto_id.clone()),
            column("party", self.party.map(|value| value.to_string())),
            column("date", self.date.map(|value| value.to_string())),
            column("partyname", self.partyname.clone()),
            column("language", self.language.clone()),
            column("source", self.source.clone()),
            column("title", self.title.clone()),
            column("url_original", self.url_original.clone()),
            column("annotations", self.annotations.map(|value| value.to_string())),
            column("has_eu_code", self.has_eu_code.map(|value| value.to_string())),
            column(
                "is_primary_doc",
                self.is_primary_doc.map(|value| value.to_string()),
            ),
            column(
                "may_contradict_core_dataset",
                self.may_contradict_core_dataset
                    .map(|value| value.to_string()),
            ),
            column("md5sum_text", self.md5sum_text.clone()),
            column("md5sum_original", self.md5sum_original.clone()),
            column("handbook", self.handbook.clone()),
            column("is_copy_of", self.is_copy_of.clone()),
        ];

        for (key, value) in &self.extra {
            let rendered = match value {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            columns.push((key.clone(), rendered));
        }

        columns
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

fn column(name: &str, value: Option<String>) -> (String, String) {
    (name.to_string(), value.unwrap_or_default())
}

/// One sentence of a manifesto with its annotation columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSentenceRow {
    pub manifesto_id: String,
    pub pos: usize,
    pub columns: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetVersions {
    pub core: String,
    pub metadata: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub versions: DatasetVersions,
    pub parties: Vec<u32>,
    pub record_count: usize,
    pub records: Vec<ManifestoRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Downloaded {
        path: String,
        url: String,
        bytes: u64,
        sha256: String,
    },
    AlreadyPresent {
        path: String,
    },
    Ineligible {
        reason: String,
    },
    Failed {
        path: String,
        url: String,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadEntry {
    pub manifesto_id: Option<String>,
    #[serde(flatten)]
    pub outcome: DownloadOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadCounts {
    pub downloaded: usize,
    pub already_present: usize,
    pub ineligible: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvExportEntry {
    pub manifesto_id: String,
    pub path: String,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchPaths {
    pub output_root: String,
    pub pdf_dir: String,
    pub csv_dir: String,
    pub metadata_manifest_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub completed_steps: Vec<String>,
    pub failed_step: Option<String>,
    pub failure_reason: Option<String>,
    pub command: String,
    pub api_url: String,
    pub versions: DatasetVersions,
    pub parties: Vec<u32>,
    pub paths: FetchPaths,
    pub record_count: usize,
    pub download_counts: Option<DownloadCounts>,
    pub downloads: Vec<DownloadEntry>,
    pub csv_file_count: usize,
    pub csv_files: Vec<CsvExportEntry>,
}

/// Subset of a fetch run manifest read back by `status`.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchRunStatus {
    pub run_id: Option<String>,
    pub status: Option<String>,
    pub started_at: Option<String>,
    pub updated_at: Option<String>,
    pub failed_step: Option<String>,
    pub failure_reason: Option<String>,
    pub record_count: Option<usize>,
    pub download_counts: Option<DownloadCounts>,
    pub csv_file_count: Option<usize>,
}
