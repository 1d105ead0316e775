pub mod export_text;
pub mod fetch;
pub mod pdf_text;
pub mod rename;
pub mod status;
pub mod versions;

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::api::ManifestoClient;
use crate::cli::ApiArgs;

pub(crate) fn connect(api: &ApiArgs) -> Result<ManifestoClient> {
    let api_key = match api.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => read_api_key(&api.api_key_file)?,
    };

    ManifestoClient::new(&api.api_url, api_key, request_timeout(api))
        .context("failed to build Manifesto API client")
}

pub(crate) fn request_timeout(api: &ApiArgs) -> Option<Duration> {
    api.timeout_secs.map(Duration::from_secs)
}

pub(crate) fn read_api_key(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read API key file {}", path.display()))?;
    let key = raw.trim();
    if key.is_empty() {
        bail!("API key file is empty: {}", path.display());
    }
    Ok(key.to_string())
}
