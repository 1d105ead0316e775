use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::util::ensure_directory;

/// Folder layout of a download root: `pdf/`, `csv/` and `manifests/`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub pdf_dir: PathBuf,
    pub csv_dir: PathBuf,
    pub manifest_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(root: &Path, pdf_dir: Option<PathBuf>, csv_dir: Option<PathBuf>) -> Self {
        Self {
            root: root.to_path_buf(),
            pdf_dir: pdf_dir.unwrap_or_else(|| root.join("pdf")),
            csv_dir: csv_dir.unwrap_or_else(|| root.join("csv")),
            manifest_dir: root.join("manifests"),
        }
    }

    pub fn prepare(&self) -> Result<()> {
        ensure_directory(&self.pdf_dir)?;
        ensure_directory(&self.csv_dir)?;
        ensure_directory(&self.manifest_dir)
    }

    pub fn pdf_path(&self, manifesto_id: &str) -> PathBuf {
        self.pdf_dir.join(format!("{manifesto_id}.pdf"))
    }

    pub fn csv_path(&self, manifesto_id: &str) -> PathBuf {
        self.csv_dir.join(format!("{manifesto_id}.csv"))
    }

    pub fn metadata_manifest_path(&self) -> PathBuf {
        self.manifest_dir.join("metadata.json")
    }
}

/// Whether a remote `manifesto_id` can name a file inside a layout folder
/// without leaving it.
pub fn is_safe_file_stem(manifesto_id: &str) -> bool {
    !manifesto_id.is_empty()
        && !manifesto_id.contains(['/', '\\', ':', '\0'])
        && !manifesto_id.contains("..")
        && !Path::new(manifesto_id).is_absolute()
}
