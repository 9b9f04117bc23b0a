use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::{error::AppError, utils::config::AppConfig};

/// Returned in place of a document id when the service accepted the document
/// but did not say what it stored it as.
pub const UNKNOWN_DOCUMENT_ID: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub source: String,
    pub file_path: String,
    pub filename: String,
}

/// Request body for `POST /api/v1/collections/{collection}/documents`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentPayload {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Thin client for the indexing service's document endpoint.
#[derive(Clone, Debug)]
pub struct IndexingClient {
    http: reqwest::Client,
    base_url: Url,
}

impl IndexingClient {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url = Url::parse(service_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Validation(format!(
                "service_url cannot be used as a base URL: {service_url}"
            )));
        }

        let http = reqwest::ClientBuilder::new().timeout(timeout).build()?;

        Ok(Self { http, base_url })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            &cfg.service_url,
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    /// `{service_url}/api/v1/collections/{collection}/documents`, with the
    /// collection name encoded as a single path segment.
    pub fn documents_url(&self, collection: &str) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                AppError::Validation(format!("invalid service url: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "v1", "collections", collection, "documents"]);
        Ok(url)
    }

    /// Submits one document and returns the id the service assigned to it.
    ///
    /// Only 200 and 201 count as accepted. Any other status comes back as
    /// [`AppError::HttpStatus`] carrying the response body verbatim.
    pub async fn submit(
        &self,
        collection: &str,
        payload: &DocumentPayload,
    ) -> Result<String, AppError> {
        let url = self.documents_url(collection)?;

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            let body: Value = response.json().await?;
            let document_id = extract_document_id(&body);
            debug!(
                filename = %payload.metadata.filename,
                status = status.as_u16(),
                %document_id,
                "indexing service accepted document"
            );
            return Ok(document_id);
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::HttpStatus {
            status: status.as_u16(),
            body,
        })
    }
}

fn extract_document_id(body: &Value) -> String {
    match body.get("document_id") {
        None | Some(Value::Null) => UNKNOWN_DOCUMENT_ID.to_string(),
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
    }
}
