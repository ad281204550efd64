//! Access tokens for Google APIs.
//!
//! Sources are tried in the usual application-default order: a pre-minted
//! token, the file named by `GOOGLE_APPLICATION_CREDENTIALS`, gcloud's
//! well-known credentials file, then the instance metadata server. Emulators
//! need none.

use super::{check_response, CloudError};
use crate::config::CredentialsConfig;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/project-id";

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// Lifetime requested for service account assertions.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

pub enum Credentials {
    Anonymous,
    Static(String),
    ServiceAccount(ServiceAccount),
    AuthorizedUser(AuthorizedUser),
    Metadata(Arc<MetadataServer>),
}

impl Credentials {
    /// Picks the first available source. An explicit credentials file that
    /// cannot be loaded is an error rather than a silent fallback.
    pub async fn discover(
        config: &CredentialsConfig,
        client: Client,
        metadata: Arc<MetadataServer>,
    ) -> Result<Self, CloudError> {
        if let Some(token) = &config.access_token {
            tracing::info!("Using access token from GOOGLE_OAUTH_ACCESS_TOKEN");
            return Ok(Credentials::Static(token.clone()));
        }

        if let Some(path) = &config.credentials_file {
            return Self::from_file(path, client).await;
        }

        if let Some(path) = &config.well_known_file {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Self::from_file(path, client).await;
            }
        }

        tracing::info!("Using metadata server credentials");
        Ok(Credentials::Metadata(metadata))
    }

    /// Loads a `service_account` key or gcloud `authorized_user` file.
    pub async fn from_file(path: &Path, client: Client) -> Result<Self, CloudError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            CloudError::Auth(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: CredentialsFile = serde_json::from_str(&contents).map_err(|e| {
            CloudError::Auth(format!(
                "unsupported credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        let credentials = match file {
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
                project_id,
            } => {
                let key = EncodingKey::from_rsa_pem(private_key.as_bytes()).map_err(|e| {
                    CloudError::Auth(format!("invalid service account private key: {}", e))
                })?;
                tracing::info!(path = %path.display(), account = %client_email, "Using service account credentials");
                Credentials::ServiceAccount(ServiceAccount {
                    client,
                    client_email,
                    private_key_id,
                    key,
                    token_uri,
                    project_id,
                    cache: TokenCache::default(),
                })
            }
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => {
                tracing::info!(path = %path.display(), "Using authorized user credentials");
                Credentials::AuthorizedUser(AuthorizedUser {
                    client,
                    client_id,
                    client_secret,
                    refresh_token,
                    token_uri,
                    cache: TokenCache::default(),
                })
            }
        };
        Ok(credentials)
    }

    /// Project named by the credentials themselves, if any.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Credentials::ServiceAccount(account) => account.project_id.as_deref(),
            _ => None,
        }
    }

    pub async fn access_token(&self) -> Result<Option<String>, CloudError> {
        match self {
            Credentials::Anonymous => Ok(None),
            Credentials::Static(token) => Ok(Some(token.clone())),
            Credentials::ServiceAccount(account) => account.access_token().await.map(Some),
            Credentials::AuthorizedUser(user) => user.access_token().await.map(Some),
            Credentials::Metadata(server) => server.access_token().await.map(Some),
        }
    }

    /// Attaches a bearer token to `request` unless anonymous.
    pub async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, CloudError> {
        Ok(match self.access_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        private_key_id: Option<String>,
        #[serde(default = "default_token_uri")]
        token_uri: String,
        #[serde(default)]
        project_id: Option<String>,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default = "default_token_uri")]
        token_uri: String,
    },
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Default)]
struct TokenCache {
    token: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Returns the cached token, calling `fetch` when it is missing or about
    /// to expire.
    async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String, CloudError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenResponse, CloudError>>,
    {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + EXPIRY_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let response = fetch().await?;
        tracing::debug!(expires_in = response.expires_in, "Fetched access token");

        let value = response.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        });
        Ok(value)
    }
}

/// Exchanges form parameters for an access token at an OAuth token endpoint.
async fn request_token(
    client: &Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse, CloudError> {
    let response = client
        .post(token_uri)
        .form(params)
        .send()
        .await
        .map_err(|e| CloudError::Auth(format!("token endpoint unreachable at {}: {}", token_uri, e)))?;

    let response = check_response(response)
        .await
        .map_err(|e| CloudError::Auth(format!("token request rejected: {}", e)))?;

    response
        .json()
        .await
        .map_err(|e| CloudError::Auth(format!("malformed token response: {}", e)))
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Service account key file; tokens come from a signed JWT assertion.
pub struct ServiceAccount {
    client: Client,
    client_email: String,
    private_key_id: Option<String>,
    key: EncodingKey,
    token_uri: String,
    project_id: Option<String>,
    cache: TokenCache,
}

impl ServiceAccount {
    fn assertion(&self) -> Result<String, CloudError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| CloudError::Auth(format!("failed to sign token request: {}", e)))
    }

    pub async fn access_token(&self) -> Result<String, CloudError> {
        self.cache
            .get_or_fetch(|| async {
                let assertion = self.assertion()?;
                request_token(
                    &self.client,
                    &self.token_uri,
                    &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
                )
                .await
            })
            .await
    }
}

/// gcloud user credentials; tokens come from the stored refresh token.
pub struct AuthorizedUser {
    client: Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: String,
    cache: TokenCache,
}

impl AuthorizedUser {
    pub async fn access_token(&self) -> Result<String, CloudError> {
        self.cache
            .get_or_fetch(|| async {
                request_token(
                    &self.client,
                    &self.token_uri,
                    &[
                        ("grant_type", REFRESH_TOKEN_GRANT),
                        ("client_id", self.client_id.as_str()),
                        ("client_secret", self.client_secret.as_str()),
                        ("refresh_token", self.refresh_token.as_str()),
                    ],
                )
                .await
            })
            .await
    }
}

/// Client for the instance metadata server.
pub struct MetadataServer {
    client: Client,
    base_url: String,
    cache: TokenCache,
}

impl MetadataServer {
    pub fn new(client: Client, host: &str) -> Self {
        Self {
            client,
            base_url: crate::config::with_scheme(host),
            cache: TokenCache::default(),
        }
    }

    pub async fn access_token(&self) -> Result<String, CloudError> {
        self.cache
            .get_or_fetch(|| async {
                self.get(TOKEN_PATH)
                    .await?
                    .json::<TokenResponse>()
                    .await
                    .map_err(|e| CloudError::Auth(format!("malformed token response: {}", e)))
            })
            .await
    }

    pub async fn project_id(&self) -> Result<String, CloudError> {
        let project_id = self
            .get(PROJECT_ID_PATH)
            .await?
            .text()
            .await
            .map_err(|e| CloudError::Auth(format!("malformed project id response: {}", e)))?;

        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(CloudError::Auth(
                "metadata server returned an empty project id".to_string(),
            ));
        }
        Ok(project_id.to_string())
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, CloudError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| {
                CloudError::Auth(format!("metadata server unreachable at {}: {}", url, e))
            })?;

        if !response.status().is_success() {
            return Err(CloudError::Auth(format!(
                "metadata server returned {} for {}",
                response.status(),
                path
            )));
        }
        Ok(response)
    }
}
