//! The three demonstration routes.

use crate::dtos::{ErrorEnvelope, FirestoreResponse, StorageListingResponse};
use crate::models::NewDocument;
use crate::services::record_upstream_call;
use crate::startup::AppState;
use axum::{extract::State, Json};

/// Field the document store fills with its commit time.
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const GREETING_MESSAGE: &str = "Hello from Flask app!";

pub async fn hello(State(state): State<AppState>) -> String {
    format!(
        "Hello from Gemini project on Cloud Run! Listening on port {}",
        state.port
    )
}

pub async fn storage_example(
    State(state): State<AppState>,
) -> Result<Json<StorageListingResponse>, ErrorEnvelope> {
    let storage = &state.config.storage;

    let objects = state
        .object_store
        .list_objects(&storage.bucket, storage.list_limit)
        .await;
    record_upstream_call("storage", "list_objects", objects.is_ok());

    let objects = objects.map_err(|e| {
        tracing::error!(bucket = %storage.bucket, "Failed to list bucket objects: {}", e);
        ErrorEnvelope::storage(&e)
    })?;

    Ok(Json(StorageListingResponse::success(&storage.bucket, objects)))
}

/// Inserts one document, then reads back the most recent ones. A failed read
/// still reports failure even though the insert has persisted.
pub async fn firestore_example(
    State(state): State<AppState>,
) -> Result<Json<FirestoreResponse>, ErrorEnvelope> {
    let firestore = &state.config.firestore;

    let document = NewDocument::new()
        .server_timestamp(TIMESTAMP_FIELD)
        .field("message", GREETING_MESSAGE);

    let added = state
        .document_store
        .add_document(&firestore.collection, document)
        .await;
    record_upstream_call("firestore", "add_document", added.is_ok());

    let document_id = added.map_err(|e| {
        tracing::error!(collection = %firestore.collection, "Failed to add document: {}", e);
        ErrorEnvelope::firestore(&e)
    })?;

    let recent = state
        .document_store
        .recent_documents(&firestore.collection, TIMESTAMP_FIELD, firestore.recent_limit)
        .await;
    record_upstream_call("firestore", "recent_documents", recent.is_ok());

    let recent = recent.map_err(|e| {
        tracing::error!(
            collection = %firestore.collection,
            document_id = %document_id,
            "Failed to query recent documents: {}",
            e
        );
        ErrorEnvelope::firestore(&e)
    })?;

    Ok(Json(FirestoreResponse::success(&document_id, recent)))
}
