//! Manifesto Project API access: the authenticated catalog client and the
//! plain HTTP source used for original documents.

mod client;
#[cfg(test)]
pub(crate) mod testing;
mod wire;

use std::io::Read;

use thiserror::Error;

use crate::model::{AnnotatedSentenceRow, ManifestoRecord};

pub use client::{HttpDocumentSource, ManifestoClient};

/// Number of manifesto keys sent per metadata or text request.
pub const KEYS_PER_REQUEST: usize = 50;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("API key rejected (status {status})")]
    Unauthorized { status: u16 },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
    #[error("dataset versions not resolved; call resolve_versions first")]
    VersionsUnresolved,
}

/// Remote catalog of manifesto metadata and annotated texts.
pub trait Catalog {
    /// All document records of the given parties.
    fn metadata(&self, parties: &[u32]) -> Result<Vec<ManifestoRecord>, ApiError>;

    /// Sentence rows for every record that carries a manifesto identifier.
    fn corpus(&self, records: &[ManifestoRecord]) -> Result<Vec<AnnotatedSentenceRow>, ApiError>;
}

/// Opens a readable body for a document URL, failing on non-success status
/// before any bytes are handed out.
pub trait DocumentSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + '_>, ApiError>;
}
