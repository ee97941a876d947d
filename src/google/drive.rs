//! Drive API collaborator.
//!
//! Only parent lookups are needed here: the folder restriction walks
//! `files.get?fields=parents` upwards until it reaches the root folder.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use super::auth::AuthHandle;
use super::failure::{parse_retry_after, ApiFailure};
use crate::types::{DriveConfig, Error, Result};

/// Parent-link lookups against Drive.
#[async_trait]
pub trait DriveClient: Send + Sync {
    /// Parent folder ids of `file_id`. Empty for top-level items.
    async fn parents(&self, file_id: &str) -> std::result::Result<Vec<String>, ApiFailure>;
}

#[derive(Debug, Deserialize)]
struct FileParents {
    #[serde(default)]
    parents: Vec<String>,
}

/// reqwest-backed Drive v3 client.
#[derive(Debug, Clone)]
pub struct HttpDriveClient {
    http: Client,
    base_url: Url,
    auth: AuthHandle,
}

impl HttpDriveClient {
    pub fn new(config: &DriveConfig, auth: AuthHandle) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::validation(format!("Invalid Drive base URL {}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::validation(format!(
                "Drive base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    fn file_url(&self, file_id: &str) -> std::result::Result<Url, ApiFailure> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiFailure::other("Drive base URL cannot carry a path", false))?
            .pop_if_empty()
            .extend(["drive", "v3", "files", file_id]);
        Ok(url)
    }
}

#[async_trait]
impl DriveClient for HttpDriveClient {
    async fn parents(&self, file_id: &str) -> std::result::Result<Vec<String>, ApiFailure> {
        let creds = self
            .auth
            .credentials()
            .await
            .map_err(|e| match e {
                Error::Auth(message) => ApiFailure::auth(message),
                other => ApiFailure::auth(other.to_string()),
            })?;

        let response = self
            .http
            .get(self.file_url(file_id)?)
            .query(&[("fields", "parents"), ("supportsAllDrives", "true")])
            .bearer_auth(creds.access_token())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let file: FileParents = response.json().await?;
            tracing::debug!(file_id, parents = file.parents.len(), "drive_parents_fetched");
            return Ok(file.parents);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&text)
            .ok()
            .or_else(|| (!text.is_empty()).then(|| Value::String(text)));

        tracing::warn!(
            file_id,
            http_status = status.as_u16(),
            retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
            "drive_request_failed"
        );

        let failure = ApiFailure::http(status.as_u16(), status.canonical_reason().unwrap_or(""), body);
        Err(match retry_after {
            Some(delay) => failure.with_retry_after(delay),
            None => failure,
        })
    }
}
