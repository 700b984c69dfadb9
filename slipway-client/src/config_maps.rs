//! Config map endpoints

use crate::ClusterClient;
use crate::error::Result;
use crate::types::ConfigMap;
use reqwest::Method;

impl ClusterClient {
    /// Create a config map in a namespace
    pub async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap> {
        let url = self.collection_url(namespace, "configmaps");
        let response = self
            .request(Method::POST, &url)
            .json(config_map)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Delete a config map by name
    pub async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        let url = self.object_url(namespace, "configmaps", name);
        let response = self.request(Method::DELETE, &url).send().await?;

        self.handle_empty_response(response).await
    }
}
