//! Firestore client backed by the REST API.
//!
//! Inserts use `documents:commit` with a client-generated id, a
//! `currentDocument.exists = false` precondition and `REQUEST_TIME` transforms
//! for server-assigned timestamps. Reads use `runQuery`.

pub mod value;

use super::{check_response, CloudError, Credentials, DocumentStore};
use crate::models::{DocumentRecord, NewDocument};
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use service_core::observability::TracedRequestExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use value::{decode_fields, encode_fields, FieldValue};

pub const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";

/// Project used against an emulator when none is configured.
pub const EMULATOR_PROJECT_ID: &str = "google-cloud-firestore-emulator";

const AUTO_ID_LENGTH: usize = 20;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<Write>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Write {
    update: Document,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    update_transforms: Vec<FieldTransform>,
    current_document: Precondition,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldTransform {
    field_path: String,
    set_to_server_value: ServerValue,
}

#[derive(Debug, Serialize)]
enum ServerValue {
    #[serde(rename = "REQUEST_TIME")]
    RequestTime,
}

#[derive(Debug, Serialize)]
struct Precondition {
    exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryRequest {
    structured_query: StructuredQuery,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StructuredQuery {
    from: Vec<CollectionSelector>,
    order_by: Vec<Order>,
    limit: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionSelector {
    collection_id: String,
}

#[derive(Debug, Serialize)]
struct Order {
    field: FieldReference,
    direction: Direction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldReference {
    field_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum Direction {
    Descending,
}

/// One element of the `runQuery` response stream. Progress-only entries carry
/// no document.
#[derive(Debug, Deserialize)]
struct RunQueryResponse {
    #[serde(default)]
    document: Option<Document>,
}

pub struct FirestoreDocumentStore {
    client: Client,
    base_url: String,
    database_path: String,
    credentials: Arc<Credentials>,
}

impl FirestoreDocumentStore {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        project_id: &str,
        database: &str,
        credentials: Arc<Credentials>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database_path: format!("projects/{}/databases/{}", project_id, database),
            credentials,
        }
    }

    fn documents_root(&self) -> String {
        format!("{}/documents", self.database_path)
    }

    /// Splits `a/b/c` into the parent resource (`.../documents/a/b`) and the
    /// collection id (`c`).
    fn collection_parent<'a>(&self, collection: &'a str) -> Result<(String, &'a str), CloudError> {
        let collection = collection.trim_matches('/');
        let (parent, id) = match collection.rsplit_once('/') {
            Some((parent, id)) => (format!("{}/{}", self.documents_root(), parent), id),
            None => (self.documents_root(), collection),
        };
        if id.is_empty() {
            return Err(CloudError::InvalidRequest(
                "collection name must not be empty".to_string(),
            ));
        }
        Ok((parent, id))
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        resource: &str,
        body: &T,
    ) -> Result<reqwest::Response, CloudError> {
        let url = format!("{}/{}", self.base_url, resource);
        let request = self.client.post(&url).json(body).with_trace_context();
        let request = self.credentials.authorize(request).await?;

        let response = request.send().await.map_err(|e| {
            tracing::error!(url = %url, "Failed to reach Firestore: {}", e);
            CloudError::from(e)
        })?;
        check_response(response).await
    }
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    async fn add_document(
        &self,
        collection: &str,
        document: NewDocument,
    ) -> Result<String, CloudError> {
        let (parent, collection_id) = self.collection_parent(collection)?;
        let document_id = auto_id();

        let request = CommitRequest {
            writes: vec![Write {
                update: Document {
                    name: Some(format!("{}/{}/{}", parent, collection_id, document_id)),
                    fields: encode_fields(&document.fields),
                },
                update_transforms: document
                    .server_timestamps
                    .iter()
                    .map(|field| FieldTransform {
                        field_path: quote_field_path(field),
                        set_to_server_value: ServerValue::RequestTime,
                    })
                    .collect(),
                current_document: Precondition { exists: false },
            }],
        };

        self.post(&format!("{}/documents:commit", self.database_path), &request)
            .await?;

        tracing::info!(
            collection = %collection,
            document_id = %document_id,
            "Added document"
        );
        Ok(document_id)
    }

    async fn recent_documents(
        &self,
        collection: &str,
        order_by: &str,
        limit: u32,
    ) -> Result<Vec<DocumentRecord>, CloudError> {
        let (parent, collection_id) = self.collection_parent(collection)?;

        let request = RunQueryRequest {
            structured_query: StructuredQuery {
                from: vec![CollectionSelector {
                    collection_id: collection_id.to_string(),
                }],
                order_by: vec![Order {
                    field: FieldReference {
                        field_path: quote_field_path(order_by),
                    },
                    direction: Direction::Descending,
                }],
                limit,
            },
        };

        let responses: Vec<RunQueryResponse> = self
            .post(&format!("{}:runQuery", parent), &request)
            .await?
            .json()
            .await?;

        let records = responses
            .into_iter()
            .filter_map(|response| response.document)
            .map(|document| {
                let id = document
                    .name
                    .as_deref()
                    .and_then(|name| name.rsplit('/').next())
                    .unwrap_or_default()
                    .to_string();
                DocumentRecord::new(id, decode_fields(&document.fields))
            })
            .collect::<Vec<_>>();

        tracing::info!(
            collection = %collection,
            count = records.len(),
            "Queried recent documents"
        );
        Ok(records)
    }
}

/// Random 20-character alphanumeric id, the same shape the Firestore SDKs use.
pub fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Backtick-quotes a field name unless it is a simple identifier.
pub fn quote_field_path(field: &str) -> String {
    let mut chars = field.chars();
    let simple = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());

    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}
