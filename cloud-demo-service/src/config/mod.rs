use service_core::config::{self as core_config, env_or, first_env};
use service_core::error::AppError;
use std::path::PathBuf;

pub const DEFAULT_BUCKET_NAME: &str = "my-gemini-app-data-bucket-123";
pub const DEFAULT_COLLECTION_NAME: &str = "my_data";
pub const DEFAULT_DATABASE_ID: &str = "(default)";
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
pub const STORAGE_API_ENDPOINT: &str = "https://storage.googleapis.com";
/// File name gcloud writes for `gcloud auth application-default login`.
pub const ADC_FILE_NAME: &str = "application_default_credentials.json";

/// Objects returned by `/storage_example`.
pub const STORAGE_LIST_LIMIT: u32 = 5;
/// Documents returned by `/firestore_example`.
pub const FIRESTORE_RECENT_LIMIT: u32 = 3;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub common: core_config::Config,
    pub storage: StorageConfig,
    pub firestore: FirestoreConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    /// Base URL of the JSON API, without the `/storage/v1` suffix.
    pub endpoint: String,
    /// Set when `endpoint` points at an emulator; requests go unauthenticated.
    pub emulated: bool,
    pub list_limit: u32,
}

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub collection: String,
    /// Resolved from the credentials file or the metadata server at startup
    /// when unset.
    pub project_id: Option<String>,
    pub database: String,
    /// `host:port` of a Firestore emulator.
    pub emulator_host: Option<String>,
    pub recent_limit: u32,
}

#[derive(Debug, Clone)]
pub struct CredentialsConfig {
    pub metadata_host: String,
    /// Pre-minted OAuth token, used instead of any other source.
    pub access_token: Option<String>,
    /// `GOOGLE_APPLICATION_CREDENTIALS`; must load when set.
    pub credentials_file: Option<PathBuf>,
    /// gcloud's application default credentials, used only if the file exists.
    pub well_known_file: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env, APP__ prefix and PORT)
        let common_config = core_config::Config::load()?;

        let storage_emulator = first_env(&["STORAGE_EMULATOR_HOST"]);

        Ok(ServiceConfig {
            common: common_config,
            storage: StorageConfig {
                bucket: env_or("GCS_BUCKET_NAME", DEFAULT_BUCKET_NAME),
                emulated: storage_emulator.is_some(),
                endpoint: storage_emulator
                    .map(|host| with_scheme(&host))
                    .unwrap_or_else(|| STORAGE_API_ENDPOINT.to_string()),
                list_limit: STORAGE_LIST_LIMIT,
            },
            firestore: FirestoreConfig {
                collection: env_or("FIRESTORE_COLLECTION_NAME", DEFAULT_COLLECTION_NAME),
                project_id: first_env(&["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"]),
                database: env_or("FIRESTORE_DATABASE_ID", DEFAULT_DATABASE_ID),
                emulator_host: first_env(&["FIRESTORE_EMULATOR_HOST"]),
                recent_limit: FIRESTORE_RECENT_LIMIT,
            },
            credentials: CredentialsConfig {
                metadata_host: env_or("GCE_METADATA_HOST", DEFAULT_METADATA_HOST),
                access_token: first_env(&["GOOGLE_OAUTH_ACCESS_TOKEN"]),
                credentials_file: first_env(&["GOOGLE_APPLICATION_CREDENTIALS"]).map(PathBuf::from),
                well_known_file: well_known_credentials_file(),
            },
        })
    }
}

fn well_known_credentials_file() -> Option<PathBuf> {
    if let Some(dir) = first_env(&["CLOUDSDK_CONFIG"]) {
        return Some(PathBuf::from(dir).join(ADC_FILE_NAME));
    }
    if cfg!(windows) {
        first_env(&["APPDATA"]).map(|dir| PathBuf::from(dir).join("gcloud").join(ADC_FILE_NAME))
    } else {
        first_env(&["HOME"]).map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("gcloud")
                .join(ADC_FILE_NAME)
        })
    }
}

/// Emulator hosts are given either as `host:port` or as a full URL.
pub fn with_scheme(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}
