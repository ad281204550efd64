use crate::models::DocumentRecord;
use crate::services::CloudError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageListingResponse {
    pub status: Status,
    pub message: String,
    pub objects: Vec<String>,
}

impl StorageListingResponse {
    pub fn success(bucket: &str, objects: Vec<String>) -> Self {
        Self {
            status: Status::Success,
            message: format!("Successfully listed objects from bucket '{}'", bucket),
            objects,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FirestoreResponse {
    pub status: Status,
    pub message: String,
    pub recent_data: Vec<DocumentRecord>,
}

impl FirestoreResponse {
    pub fn success(document_id: &str, recent_data: Vec<DocumentRecord>) -> Self {
        Self {
            status: Status::Success,
            message: format!(
                "Added document with ID: {}. Retrieved recent documents.",
                document_id
            ),
            recent_data,
        }
    }
}

/// Error body shared by the example routes; always answered with HTTP 500.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: Status,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
        }
    }

    pub fn storage(err: &CloudError) -> Self {
        Self::new(format!("Failed to access Cloud Storage: {}", err))
    }

    pub fn firestore(err: &CloudError) -> Self {
        Self::new(format!("Failed to access Firestore: {}", err))
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
