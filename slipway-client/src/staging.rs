//! Staging object store client
//!
//! Build contexts that are too large to travel inline are uploaded to an
//! HTTP object store that the remote executor can read from. The store only
//! needs to accept `PUT` and `DELETE` on object URLs.

use crate::error::{ClientError, Result};
use reqwest::Client;
use tracing::debug;

/// HTTP client for a staging bucket
#[derive(Debug, Clone)]
pub struct StagingClient {
    /// Base URL objects are created under (e.g., "https://storage.example.com/bucket")
    base_url: String,
    client: Client,
}

impl StagingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of an object
    pub fn object_url(&self, object: &str) -> String {
        format!("{}/{}", self.base_url, object.trim_start_matches('/'))
    }

    /// Upload an object
    ///
    /// # Returns
    /// The URL the object can be read back from
    pub async fn upload(&self, object: &str, body: Vec<u8>) -> Result<String> {
        let url = self.object_url(object);
        debug!("Uploading {} bytes to {}", body.len(), url);

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        Ok(url)
    }

    /// Delete an object
    pub async fn delete(&self, object: &str) -> Result<()> {
        let url = self.object_url(object);
        let response = self.client.delete(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        Ok(())
    }
}
