use crate::config::ServiceConfig;
use crate::handlers;
use crate::services::firestore::{EMULATOR_PROJECT_ID, FIRESTORE_API_BASE};
use crate::services::{
    Credentials, DocumentStore, FirestoreDocumentStore, GcsObjectStore, MetadataServer,
    ObjectStore,
};
use axum::{middleware, routing::get, Router};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    /// Port the listener is actually bound to.
    pub port: u16,
    pub object_store: Arc<dyn ObjectStore>,
    pub document_store: Arc<dyn DocumentStore>,
}

pub struct Application {
    port: u16,
    server: Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>,
    state: AppState,
}

impl Application {
    /// Connects the Cloud Storage and Firestore clients, then binds the server.
    pub async fn build(config: ServiceConfig) -> Result<Self, AppError> {
        let (object_store, document_store) = connect_clients(&config).await?;
        Self::build_with_stores(config, object_store, document_store).await
    }

    pub async fn build_with_stores(
        config: ServiceConfig,
        object_store: Arc<dyn ObjectStore>,
        document_store: Arc<dyn DocumentStore>,
    ) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port = port,
            bucket = %config.storage.bucket,
            collection = %config.firestore.collection,
            "Listening on {}",
            port
        );

        let state = AppState {
            config: Arc::new(config),
            port,
            object_store,
            document_store,
        };

        let server = axum::serve(listener, router(state.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .into_future();

        Ok(Self {
            port,
            server: Box::pin(server),
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::hello))
        .route("/storage_example", get(handlers::storage_example))
        .route("/firestore_example", get(handlers::firestore_example))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Builds both clients once for the lifetime of the process. Emulators are
/// reached without credentials; otherwise application default credentials
/// are discovered once and shared.
async fn connect_clients(
    config: &ServiceConfig,
) -> Result<(Arc<dyn ObjectStore>, Arc<dyn DocumentStore>), AppError> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("cloud-demo-service/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let firestore = &config.firestore;
    let anonymous = Arc::new(Credentials::Anonymous);
    let metadata = Arc::new(MetadataServer::new(
        http.clone(),
        &config.credentials.metadata_host,
    ));

    let needs_credentials = !config.storage.emulated || firestore.emulator_host.is_none();
    let credentials = if needs_credentials {
        let discovered = Credentials::discover(&config.credentials, http.clone(), metadata.clone())
            .await
            .map_err(|e| {
                tracing::error!("Failed to load Google Cloud credentials: {}", e);
                AppError::ConfigError(anyhow::anyhow!("{}", e))
            })?;
        Arc::new(discovered)
    } else {
        anonymous.clone()
    };

    let storage_credentials = if config.storage.emulated {
        tracing::info!(endpoint = %config.storage.endpoint, "Using Cloud Storage emulator");
        anonymous.clone()
    } else {
        credentials.clone()
    };
    let object_store: Arc<dyn ObjectStore> = Arc::new(GcsObjectStore::new(
        http.clone(),
        config.storage.endpoint.clone(),
        storage_credentials,
    ));

    let (base_url, firestore_credentials) = match &firestore.emulator_host {
        Some(host) => {
            tracing::info!(host = %host, "Using Firestore emulator");
            (
                format!("{}/v1", crate::config::with_scheme(host)),
                anonymous,
            )
        }
        None => (FIRESTORE_API_BASE.to_string(), credentials.clone()),
    };

    let project_id = match (&firestore.project_id, &firestore.emulator_host) {
        (Some(project_id), _) => project_id.clone(),
        (None, Some(_)) => EMULATOR_PROJECT_ID.to_string(),
        (None, None) => match credentials.project_id() {
            Some(project_id) => project_id.to_string(),
            None => metadata.project_id().await.map_err(|e| {
                tracing::error!("Failed to determine Google Cloud project: {}", e);
                AppError::ConfigError(anyhow::anyhow!(
                    "GOOGLE_CLOUD_PROJECT is not set and the project could not be discovered: {}",
                    e
                ))
            })?,
        },
    };
    tracing::info!(project_id = %project_id, database = %firestore.database, "Firestore client ready");

    let document_store: Arc<dyn DocumentStore> = Arc::new(FirestoreDocumentStore::new(
        http,
        base_url,
        &project_id,
        &firestore.database,
        firestore_credentials,
    ));

    Ok((object_store, document_store))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
