//! # Vault Client Operations
//!
//! Read, list, and copy-on-write mutation of KV v2 engine paths. Every
//! public operation emits one named trace span through the client's
//! [`Observability`] context.
//!
//! Create, update and delete are read-then-write and deliberately carry no
//! compare-and-swap against the engine version: concurrent writers to the
//! same engine are last-writer-wins, best-effort. Only the Kubernetes
//! publish path does optimistic concurrency.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, Instrument};

use crate::config::Config;
use crate::observability::Observability;

use super::api::{HttpStoreApi, StoreApi};
use super::auth::{authenticate, AuthStrategy};
use super::error::VaultError;
use super::gcp::IamCredentialsClient;
use super::types::{Credential, Envelope, SecretSet, WriteReceipt};

/// Authenticated handle to the secret store.
///
/// Construction runs the configured login flow exactly once; the
/// resulting credential lives as long as the client and is never
/// refreshed.
pub struct VaultClient {
    api: Arc<dyn StoreApi>,
    credential: Credential,
    obs: Observability,
}

impl fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultClient")
            .field("credential", &self.credential)
            .field("obs", &self.obs)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Connect to the store named in `config` and authenticate.
    ///
    /// # Errors
    ///
    /// Any authentication failure is fatal; see
    /// [`super::error::AuthError`].
    pub async fn new(config: &Config, obs: Observability) -> Result<Self, VaultError> {
        let api = Arc::new(HttpStoreApi::new(&config.vault_addr)?);
        Self::login(api, None, config, obs).await
    }

    /// Authenticate against an explicit store API and optional identity
    /// client. This is the seam tests use to point every endpoint at a
    /// mock server.
    ///
    /// # Errors
    ///
    /// Any authentication failure is fatal.
    pub async fn login(
        api: Arc<dyn StoreApi>,
        iam: Option<&IamCredentialsClient>,
        config: &Config,
        obs: Observability,
    ) -> Result<Self, VaultError> {
        let strategy = AuthStrategy::select(config);
        let credential =
            authenticate(&strategy, api.as_ref(), iam, &config.vault_role, &obs).await?;
        info!("vault login succeeded");
        Ok(Self {
            api,
            credential,
            obs,
        })
    }

    /// Client over a pre-provisioned credential; no login flow runs.
    pub fn with_credential(
        api: Arc<dyn StoreApi>,
        credential: Credential,
        obs: Observability,
    ) -> Self {
        Self {
            api,
            credential,
            obs,
        }
    }

    pub fn observability(&self) -> &Observability {
        &self.obs
    }

    /// Read the key/value data at `engine`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an empty envelope; `MalformedData` when the data
    /// sub-object is not a flat string-keyed map.
    pub async fn secret_from_vault(&self, engine: &str) -> Result<SecretSet, VaultError> {
        let span = self.obs.span("SecretFromVault");
        async {
            let envelope = self.read_envelope(engine).await?;
            secret_data(engine, &envelope)
        }
        .instrument(span)
        .await
    }

    /// Read the current version counter at `engine`.
    ///
    /// # Errors
    ///
    /// `VersionUnavailable` when the counter is absent or non-numeric.
    pub async fn secret_version_from_vault(&self, engine: &str) -> Result<i64, VaultError> {
        let span = self.obs.span("SecretVersionFromVault");
        async {
            let envelope = self.read_envelope(engine).await?;
            secret_version(engine, &envelope)
        }
        .instrument(span)
        .await
    }

    /// List the immediate child names under `path`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the store returns nil; `UnexpectedElement` when a
    /// listed element is not a string.
    pub async fn engines_from_vault(&self, path: &str) -> Result<Vec<String>, VaultError> {
        let span = self.obs.span("EnginesFromVault");
        async {
            let envelope = self
                .api
                .list(&self.credential, path)
                .await?
                .ok_or_else(|| VaultError::NotFound {
                    engine: path.to_string(),
                })?;
            list_keys(path, &envelope)
        }
        .instrument(span)
        .await
    }

    /// Write the full key/value map as a new version at `engine`.
    /// The store is copy-on-write: this never partial-patches.
    ///
    /// # Errors
    ///
    /// `WriteRejected` wrapping the store's error.
    pub async fn write(&self, engine: &str, data: &SecretSet) -> Result<WriteReceipt, VaultError> {
        let span = self.obs.span("write");
        async {
            let payload = json!({ "data": data });
            let envelope = self
                .api
                .write(&self.credential, engine, &payload)
                .await
                .map_err(|source| VaultError::WriteRejected {
                    engine: engine.to_string(),
                    source: Box::new(source),
                })?;
            Ok(write_receipt(envelope.as_ref()))
        }
        .instrument(span)
        .await
    }

    /// Add a new key to `engine`.
    ///
    /// # Errors
    ///
    /// `KeyExists` when the key is already present; the engine version is
    /// left unchanged in that case.
    pub async fn create(
        &self,
        engine: &str,
        key: &str,
        value: &str,
    ) -> Result<WriteReceipt, VaultError> {
        let span = self.obs.span("create");
        async {
            let mut data = self.secret_from_vault(engine).await?;
            if data.contains_key(key) {
                return Err(VaultError::KeyExists {
                    key: key.to_string(),
                    engine: engine.to_string(),
                });
            }
            data.insert(key.to_string(), value.to_string());
            self.write(engine, &data).await
        }
        .instrument(span)
        .await
    }

    /// Overwrite the value of an existing key in `engine`.
    ///
    /// # Errors
    ///
    /// `KeyMissing` when the key is absent; the engine version is left
    /// unchanged in that case.
    pub async fn update(
        &self,
        engine: &str,
        key: &str,
        value: &str,
    ) -> Result<WriteReceipt, VaultError> {
        let span = self.obs.span("Update");
        async {
            let mut data = self.secret_from_vault(engine).await?;
            if !data.contains_key(key) {
                return Err(VaultError::KeyMissing {
                    key: key.to_string(),
                    engine: engine.to_string(),
                });
            }
            data.insert(key.to_string(), value.to_string());
            self.write(engine, &data).await
        }
        .instrument(span)
        .await
    }

    /// Remove a key from `engine`.
    ///
    /// # Errors
    ///
    /// `KeyMissing` when the key is absent; the engine version is left
    /// unchanged in that case.
    pub async fn delete(&self, engine: &str, key: &str) -> Result<WriteReceipt, VaultError> {
        let span = self.obs.span("delete");
        async {
            let mut data = self.secret_from_vault(engine).await?;
            if data.remove(key).is_none() {
                return Err(VaultError::KeyMissing {
                    key: key.to_string(),
                    engine: engine.to_string(),
                });
            }
            self.write(engine, &data).await
        }
        .instrument(span)
        .await
    }

    /// Initialize an engine path with an empty map.
    ///
    /// # Errors
    ///
    /// `WriteRejected` wrapping the store's error.
    pub async fn create_path(&self, engine: &str) -> Result<WriteReceipt, VaultError> {
        let span = self.obs.span("createPath");
        async { self.write(engine, &SecretSet::new()).await }
            .instrument(span)
            .await
    }

    async fn read_envelope(&self, engine: &str) -> Result<Envelope, VaultError> {
        self.api
            .read(&self.credential, engine)
            .await?
            .ok_or_else(|| VaultError::NotFound {
                engine: engine.to_string(),
            })
    }
}

/// Unwrap `data.data` into a flat string map, strictly.
fn secret_data(engine: &str, envelope: &Envelope) -> Result<SecretSet, VaultError> {
    let data = envelope.data.as_ref().ok_or_else(|| VaultError::NotFound {
        engine: engine.to_string(),
    })?;

    let malformed = || VaultError::MalformedData {
        engine: engine.to_string(),
    };

    let inner = data.get("data").and_then(Value::as_object).ok_or_else(malformed)?;

    let mut set = SecretSet::new();
    for (key, value) in inner {
        match value {
            Value::String(text) => {
                set.insert(key.clone(), text.clone());
            }
            _ => return Err(malformed()),
        }
    }

    Ok(set)
}

/// Extract the version counter from `data.current_version`, falling back
/// to `data.metadata.version`. Accepts integers and numeric strings.
fn secret_version(engine: &str, envelope: &Envelope) -> Result<i64, VaultError> {
    let unavailable = || VaultError::VersionUnavailable {
        engine: engine.to_string(),
    };

    let data = envelope.data.as_ref().ok_or_else(unavailable)?;
    let raw = data
        .get("current_version")
        .or_else(|| data.get("metadata").and_then(|m| m.get("version")))
        .ok_or_else(unavailable)?;

    match raw {
        Value::Number(number) => number.as_i64().ok_or_else(unavailable),
        Value::String(text) => text.parse::<i64>().map_err(|_| unavailable()),
        _ => Err(unavailable()),
    }
}

/// Extract `data.keys` as a string list. A missing `keys` field is an
/// empty listing; a non-string element is a contract violation.
fn list_keys(path: &str, envelope: &Envelope) -> Result<Vec<String>, VaultError> {
    let Some(elements) = envelope
        .data
        .as_ref()
        .and_then(|data| data.get("keys"))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    let mut keys = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            Value::String(name) => keys.push(name.clone()),
            _ => {
                return Err(VaultError::UnexpectedElement {
                    path: path.to_string(),
                })
            }
        }
    }

    Ok(keys)
}

fn write_receipt(envelope: Option<&Envelope>) -> WriteReceipt {
    let version = envelope
        .and_then(|e| e.data.as_ref())
        .and_then(|data| data.get("version"))
        .and_then(Value::as_i64);
    WriteReceipt { version }
}
