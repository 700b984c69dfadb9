//! Staging repository
//!
//! Stores uploaded build contexts until the remote executor has read them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use slipway_client::StagingClient;

/// Repository trait for the staging object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads an object
    ///
    /// # Returns
    /// The URL the executor reads the object from
    async fn upload(&self, object: &str, body: Vec<u8>) -> Result<String>;

    async fn delete(&self, object: &str) -> Result<()>;
}

/// HTTP implementation of ObjectStore
pub struct HttpObjectStore {
    client: StagingClient,
}

impl HttpObjectStore {
    /// Creates a new HTTP object store
    ///
    /// # Arguments
    /// * `base_url` - Bucket URL objects are created under
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: StagingClient::new(base_url),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, object: &str, body: Vec<u8>) -> Result<String> {
        self.client
            .upload(object, body)
            .await
            .with_context(|| format!("Failed to upload {}", self.client.object_url(object)))
    }

    async fn delete(&self, object: &str) -> Result<()> {
        self.client
            .delete(object)
            .await
            .with_context(|| format!("Failed to delete {}", self.client.object_url(object)))
    }
}
