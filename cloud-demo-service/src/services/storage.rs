use super::{check_response, CloudError, Credentials, ObjectStore};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use service_core::observability::TracedRequestExt;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
}

/// Cloud Storage client backed by the JSON API.
pub struct GcsObjectStore {
    client: Client,
    endpoint: String,
    credentials: Arc<Credentials>,
}

impl GcsObjectStore {
    pub fn new(client: Client, endpoint: impl Into<String>, credentials: Arc<Credentials>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            credentials,
        }
    }

    fn list_url(&self, bucket: &str) -> Result<Url, CloudError> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            CloudError::InvalidRequest(format!("invalid storage endpoint {}: {}", self.endpoint, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                CloudError::InvalidRequest(format!("invalid storage endpoint {}", self.endpoint))
            })?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o"]);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn list_objects(&self, bucket: &str, max_results: u32) -> Result<Vec<String>, CloudError> {
        let url = self.list_url(bucket)?;

        let request = self
            .client
            .get(url)
            .query(&[
                ("maxResults", max_results.to_string()),
                ("fields", "items(name)".to_string()),
            ])
            .with_trace_context();
        let request = self.credentials.authorize(request).await?;

        let response = request.send().await.map_err(|e| {
            tracing::error!(bucket = %bucket, "Failed to reach Cloud Storage: {}", e);
            CloudError::from(e)
        })?;
        let listing: ListObjectsResponse = check_response(response).await?.json().await?;

        // Emulators do not always honour maxResults.
        let names: Vec<String> = listing
            .items
            .into_iter()
            .take(max_results as usize)
            .map(|object| object.name)
            .collect();

        tracing::info!(bucket = %bucket, count = names.len(), "Listed bucket objects");
        Ok(names)
    }
}
