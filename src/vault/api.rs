//! # Store API
//!
//! The HTTP seam between the client logic and Vault. [`StoreApi`] mirrors
//! the subset of Vault's logical API the sync needs (read, list, write,
//! login); [`HttpStoreApi`] is the reqwest implementation. Tests swap in
//! an in-memory implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::error::{AuthError, VaultError};
use super::types::{Credential, Envelope};

/// The subset of Vault's logical API used by [`super::VaultClient`].
///
/// Every read-style operation resolves a missing path to `Ok(None)` rather
/// than an error; the client layer decides what absence means per
/// operation.
#[async_trait]
pub trait StoreApi: Send + Sync {
    async fn read(&self, token: &Credential, path: &str) -> Result<Option<Envelope>, VaultError>;

    /// List immediate child names under `path`.
    async fn list(&self, token: &Credential, path: &str) -> Result<Option<Envelope>, VaultError>;

    /// Write a payload to `path`. The payload is the full request body,
    /// i.e. `{"data": {...}}` for KV v2 data paths.
    async fn write(
        &self,
        token: &Credential,
        path: &str,
        payload: &Value,
    ) -> Result<Option<Envelope>, VaultError>;

    /// Unauthenticated login against `auth/<mount>/login`.
    async fn login(&self, mount: &str, payload: &Value) -> Result<Envelope, AuthError>;
}

/// reqwest-backed [`StoreApi`] speaking Vault's `/v1/<path>` wire format.
#[derive(Debug, Clone)]
pub struct HttpStoreApi {
    http: reqwest::Client,
    base: String,
}

impl HttpStoreApi {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(addr: &str) -> Result<Self, VaultError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(VaultError::Client)?;
        Ok(Self {
            http,
            base: addr.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base, path.trim_start_matches('/'))
    }

    async fn handle(path: &str, response: reqwest::Response) -> Result<Option<Envelope>, VaultError> {
        let status = response.status();

        // Vault answers 404 for unknown paths and 204 for writes without
        // response data; neither is an error at this layer.
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }

        if !status.is_success() {
            return Err(VaultError::Api {
                path: path.to_string(),
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let envelope = response
            .json::<Envelope>()
            .await
            .map_err(|source| VaultError::Transport {
                path: path.to_string(),
                source,
            })?;

        Ok(Some(envelope))
    }
}

#[async_trait]
impl StoreApi for HttpStoreApi {
    async fn read(&self, token: &Credential, path: &str) -> Result<Option<Envelope>, VaultError> {
        let response = self
            .http
            .get(self.url(path))
            .header("X-Vault-Token", token.expose())
            .send()
            .await
            .map_err(|source| VaultError::Transport {
                path: path.to_string(),
                source,
            })?;

        Self::handle(path, response).await
    }

    async fn list(&self, token: &Credential, path: &str) -> Result<Option<Envelope>, VaultError> {
        let response = self
            .http
            .get(self.url(path))
            .query(&[("list", "true")])
            .header("X-Vault-Token", token.expose())
            .send()
            .await
            .map_err(|source| VaultError::Transport {
                path: path.to_string(),
                source,
            })?;

        Self::handle(path, response).await
    }

    async fn write(
        &self,
        token: &Credential,
        path: &str,
        payload: &Value,
    ) -> Result<Option<Envelope>, VaultError> {
        let response = self
            .http
            .post(self.url(path))
            .header("X-Vault-Token", token.expose())
            .json(payload)
            .send()
            .await
            .map_err(|source| VaultError::Transport {
                path: path.to_string(),
                source,
            })?;

        Self::handle(path, response).await
    }

    async fn login(&self, mount: &str, payload: &Value) -> Result<Envelope, AuthError> {
        let path = format!("auth/{mount}/login");
        let response = self
            .http
            .post(self.url(&path))
            .json(payload)
            .send()
            .await
            .map_err(|source| AuthError::LoginRequest {
                mount: mount.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::LoginRejected {
                mount: mount.to_string(),
                message: error_message(response).await,
            });
        }

        response
            .json::<Envelope>()
            .await
            .map_err(|source| AuthError::LoginRequest {
                mount: mount.to_string(),
                source,
            })
    }
}

/// Best-effort extraction of Vault's `{"errors": [...]}` body.
async fn error_message(response: reqwest::Response) -> String {
    #[derive(Deserialize)]
    struct Errors {
        #[serde(default)]
        errors: Vec<String>,
    }

    match response.json::<Errors>().await {
        Ok(body) if !body.errors.is_empty() => body.errors.join(", "),
        _ => "no error detail returned".to_string(),
    }
}
