use std::io::Read;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::wire::{
    CoreVersionsResponse, MetadataResponse, MetadataVersionsResponse, TextsResponse,
    record_from_item, select_core_rows, sentence_rows, value_text,
};
use super::{ApiError, Catalog, DocumentSource, KEYS_PER_REQUEST};
use crate::model::{AnnotatedSentenceRow, DatasetVersions, ManifestoRecord};

const USER_AGENT: &str = concat!("manifesto-fetch/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_LIMIT: usize = 512;

/// Authenticated client for the Manifesto Project API.
///
/// The API key travels with every request as the `api_key` query parameter.
pub struct ManifestoClient {
    http: Client,
    api_url: String,
    api_key: String,
    versions: Option<DatasetVersions>,
}

impl ManifestoClient {
    /// `api_url` should be like `https://manifesto-project.wzb.eu/api/v1`.
    pub fn new(api_url: &str, api_key: String, timeout: Option<Duration>) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_http_client(timeout)?,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            versions: None,
        })
    }

    pub fn list_core_versions(&self) -> Result<Vec<(String, Option<String>)>, ApiError> {
        let response: CoreVersionsResponse = self.get_json("list_core_versions", &[])?;
        Ok(response
            .datasets
            .into_iter()
            .map(|entry| (entry.id, entry.name))
            .collect())
    }

    pub fn list_metadata_versions(&self) -> Result<Vec<String>, ApiError> {
        let response: MetadataVersionsResponse = self.get_json("list_metadata_versions", &[])?;
        Ok(response.versions.iter().filter_map(value_text).collect())
    }

    /// Pins the core dataset and metadata versions used by catalog calls.
    ///
    /// Versions left as `None` resolve to the newest one the API lists.
    pub fn resolve_versions(
        &mut self,
        core: Option<String>,
        metadata: Option<String>,
    ) -> Result<DatasetVersions, ApiError> {
        let core = match core {
            Some(core) => core,
            None => self
                .list_core_versions()?
                .pop()
                .map(|(id, _)| id)
                .ok_or_else(|| ApiError::UnexpectedShape("no core dataset versions listed".into()))?,
        };
        let metadata = match metadata {
            Some(metadata) => metadata,
            None => self
                .list_metadata_versions()?
                .pop()
                .ok_or_else(|| ApiError::UnexpectedShape("no metadata versions listed".into()))?,
        };

        let versions = DatasetVersions { core, metadata };
        info!(core = %versions.core, metadata = %versions.metadata, "resolved dataset versions");
        self.versions = Some(versions.clone());
        Ok(versions)
    }

    fn versions(&self) -> Result<&DatasetVersions, ApiError> {
        self.versions.as_ref().ok_or(ApiError::VersionsUnresolved)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.api_url, endpoint);
        let mut query: Vec<(&str, &str)> = vec![("api_key", self.api_key.as_str())];
        query.extend(params.iter().map(|(name, value)| (*name, value.as_str())));

        debug!(url = %url, params = params.len(), "requesting catalog endpoint");
        let resp = self.http.get(&url).query(&query).send()?;
        let resp = check_catalog_status(resp)?;
        let body = resp.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl Catalog for ManifestoClient {
    fn metadata(&self, parties: &[u32]) -> Result<Vec<ManifestoRecord>, ApiError> {
        let versions = self.versions()?;

        info!(core = %versions.core, parties = ?parties, "pulling core dataset");
        let core: Vec<Vec<serde_json::Value>> =
            self.get_json("get_core", &[("key", versions.core.clone())])?;
        let selection = select_core_rows(&core, parties)?;
        info!(keys = selection.keys.len(), "selected manifesto keys");

        let mut records = Vec::with_capacity(selection.keys.len());
        for batch in selection.keys.chunks(KEYS_PER_REQUEST) {
            let params = keyed_params(batch, &versions.metadata);
            let response: MetadataResponse = self.get_json("metadata", &params)?;
            if !response.missing_items.is_empty() {
                warn!(
                    missing = ?response.missing_items,
                    "metadata missing for some manifesto keys"
                );
            }
            for item in response.items {
                records.push(record_from_item(item, &selection.party_names));
            }
        }

        info!(count = records.len(), "pulled metadata records");
        Ok(records)
    }

    fn corpus(&self, records: &[ManifestoRecord]) -> Result<Vec<AnnotatedSentenceRow>, ApiError> {
        let versions = self.versions()?;

        let mut keys: Vec<String> = Vec::new();
        for id in records.iter().filter_map(ManifestoRecord::id) {
            if !keys.iter().any(|key| key == id) {
                keys.push(id.to_string());
            }
        }

        let mut rows = Vec::new();
        for batch in keys.chunks(KEYS_PER_REQUEST) {
            let params = keyed_params(batch, &versions.metadata);
            let response: TextsResponse = self.get_json("texts_and_annotations", &params)?;
            if !response.missing_items.is_empty() {
                warn!(
                    missing = ?response.missing_items,
                    "texts missing for some manifesto keys"
                );
            }
            for document in response.items {
                rows.extend(sentence_rows(document));
            }
        }

        info!(documents = keys.len(), rows = rows.len(), "pulled annotated texts");
        Ok(rows)
    }
}

/// Unauthenticated GET source for original documents.
pub struct HttpDocumentSource {
    http: Client,
}

impl HttpDocumentSource {
    pub fn new(timeout: Option<Duration>) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_http_client(timeout)?,
        })
    }
}

impl DocumentSource for HttpDocumentSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + '_>, ApiError> {
        let resp = self.http.get(url).send()?;
        let resp = check_status(resp)?;
        Ok(Box::new(resp))
    }
}

fn build_http_client(timeout: Option<Duration>) -> Result<Client, ApiError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

fn keyed_params(keys: &[String], version: &str) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> =
        keys.iter().map(|key| ("keys[]", key.clone())).collect();
    params.push(("version", version.to_string()));
    params
}

/// Catalog calls carry the API key, so 401 and 403 mean it was refused.
fn check_catalog_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized {
            status: status.as_u16(),
        });
    }
    check_status(resp)
}

fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let mut body = resp.text().unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let cut = (0..=ERROR_BODY_LIMIT)
            .rev()
            .find(|index| body.is_char_boundary(*index))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(ApiError::Server {
        status: status.as_u16(),
        body,
    })
}
