#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cloud_demo_service::config::{
    CredentialsConfig, FirestoreConfig, ServiceConfig, StorageConfig, FIRESTORE_RECENT_LIMIT,
    STORAGE_LIST_LIMIT,
};
use cloud_demo_service::models::{DocumentRecord, NewDocument};
use cloud_demo_service::services::firestore::value::format_timestamp;
use cloud_demo_service::services::{CloudError, DocumentStore, ObjectStore};
use cloud_demo_service::startup::Application;
use serde_json::{Map, Value};
use service_core::config::Config as CoreConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_BUCKET: &str = "test-bucket";
pub const TEST_COLLECTION: &str = "test_data";

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        common: CoreConfig { port: 0 }, // Random port for testing
        storage: StorageConfig {
            bucket: TEST_BUCKET.to_string(),
            endpoint: "http://127.0.0.1:1".to_string(),
            emulated: true,
            list_limit: STORAGE_LIST_LIMIT,
        },
        firestore: FirestoreConfig {
            collection: TEST_COLLECTION.to_string(),
            project_id: Some("test-project".to_string()),
            database: "(default)".to_string(),
            emulator_host: None,
            recent_limit: FIRESTORE_RECENT_LIMIT,
        },
        credentials: CredentialsConfig {
            metadata_host: "127.0.0.1:1".to_string(),
            access_token: None,
            credentials_file: None,
            well_known_file: None,
        },
    }
}

/// Object store holding a fixed set of buckets.
#[derive(Default)]
pub struct InMemoryObjectStore {
    buckets: HashMap<String, Vec<String>>,
}

impl InMemoryObjectStore {
    pub fn with_bucket(mut self, bucket: &str, objects: &[&str]) -> Self {
        self.buckets.insert(
            bucket.to_string(),
            objects.iter().map(|name| name.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_objects(&self, bucket: &str, max_results: u32) -> Result<Vec<String>, CloudError> {
        let objects = self.buckets.get(bucket).ok_or_else(|| CloudError::Api {
            status: 404,
            message: "The specified bucket does not exist.".to_string(),
        })?;
        Ok(objects.iter().take(max_results as usize).cloned().collect())
    }
}

struct StoredDocument {
    id: String,
    timestamp: DateTime<Utc>,
    fields: Map<String, Value>,
}

/// Document store that assigns strictly increasing server timestamps.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<StoredDocument>>>,
    next_id: Mutex<u64>,
    unreachable: AtomicBool,
    fail_queries: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn check_reachable(&self) -> Result<(), CloudError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CloudError::Connection(
                "error sending request: connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn add_document(
        &self,
        collection: &str,
        document: NewDocument,
    ) -> Result<String, CloudError> {
        self.check_reachable()?;

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("doc{:04}", *next)
        };

        let mut collections = self.collections.lock().unwrap();
        let docs = collections.entry(collection.to_string()).or_default();
        let timestamp = docs
            .last()
            .map(|doc| doc.timestamp + Duration::milliseconds(1))
            .unwrap_or_else(Utc::now);
        let mut fields = document.fields;
        for field in &document.server_timestamps {
            fields.insert(field.clone(), Value::String(timestamp.to_rfc3339()));
        }
        docs.push(StoredDocument {
            id: id.clone(),
            timestamp,
            fields,
        });
        Ok(id)
    }

    async fn recent_documents(
        &self,
        collection: &str,
        order_by: &str,
        limit: u32,
    ) -> Result<Vec<DocumentRecord>, CloudError> {
        self.check_reachable()?;
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(CloudError::Api {
                status: 503,
                message: "UNAVAILABLE: The service is currently unavailable.".to_string(),
            });
        }

        let collections = self.collections.lock().unwrap();
        let mut docs: Vec<&StoredDocument> = collections
            .get(collection)
            .map(|docs| docs.iter().collect())
            .unwrap_or_default();
        assert_eq!(order_by, "timestamp");
        docs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(docs
            .into_iter()
            .take(limit as usize)
            .map(|doc| {
                let mut fields = doc.fields.clone();
                if let Some(Value::String(raw)) = fields.get("timestamp").cloned() {
                    fields.insert("timestamp".to_string(), Value::String(format_timestamp(&raw)));
                }
                DocumentRecord::new(doc.id.clone(), fields)
            })
            .collect())
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub documents: Arc<InMemoryDocumentStore>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let objects = InMemoryObjectStore::default().with_bucket(
            TEST_BUCKET,
            &["a.txt", "b.txt", "c.txt", "d.txt", "e.txt", "f.txt", "g.txt"],
        );
        Self::spawn_with(test_config(), objects).await
    }

    pub async fn spawn_with(config: ServiceConfig, objects: InMemoryObjectStore) -> Self {
        let documents = Arc::new(InMemoryDocumentStore::default());

        let app = Application::build_with_stores(config, Arc::new(objects), documents.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            documents,
        }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }
}
