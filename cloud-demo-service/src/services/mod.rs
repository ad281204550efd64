//! Clients for the managed services behind the example routes.
//!
//! Each backend sits behind a trait so the router only sees
//! `Arc<dyn ObjectStore>` / `Arc<dyn DocumentStore>`.

pub mod credentials;
pub mod firestore;
pub mod metrics;
pub mod storage;

use crate::models::{DocumentRecord, NewDocument};
use async_trait::async_trait;
use serde::Deserialize;
use service_core::error::AppError;
use thiserror::Error;

pub use credentials::{Credentials, MetadataServer};
pub use firestore::FirestoreDocumentStore;
pub use self::metrics::{get_metrics, init_metrics, record_upstream_call};
pub use storage::GcsObjectStore;

/// Error type for object and document store operations.
///
/// The `Display` text is embedded verbatim in route error envelopes.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("{status} {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("credentials unavailable: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for CloudError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CloudError::Decode(err.to_string())
        } else {
            CloudError::Connection(err.to_string())
        }
    }
}

impl From<CloudError> for AppError {
    fn from(err: CloudError) -> Self {
        AppError::BadGateway(err.to_string())
    }
}

/// Lists object names in a bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns at most `max_results` names in the order the store lists them.
    async fn list_objects(&self, bucket: &str, max_results: u32) -> Result<Vec<String>, CloudError>;
}

/// Inserts and queries documents in a collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a new document with a fresh identifier and returns that identifier.
    async fn add_document(
        &self,
        collection: &str,
        document: NewDocument,
    ) -> Result<String, CloudError>;

    /// Returns up to `limit` documents ordered by `order_by` descending.
    async fn recent_documents(
        &self,
        collection: &str,
        order_by: &str,
        limit: u32,
    ) -> Result<Vec<DocumentRecord>, CloudError>;
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Passes successful responses through and turns anything else into
/// `CloudError::Api`, preferring the message from Google's error body.
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, CloudError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<GoogleErrorBody>(&body) {
        Ok(parsed) if !parsed.error.message.is_empty() => match parsed.error.status {
            Some(code) => format!("{}: {}", code, parsed.error.message),
            None => parsed.error.message,
        },
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
    };

    Err(CloudError::Api {
        status: status.as_u16(),
        message,
    })
}
