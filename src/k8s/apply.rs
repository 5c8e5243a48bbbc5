//! The create-or-update publish protocol.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use thiserror::Error;
use tracing::{info, warn, Instrument};

use crate::constants::{APPLY_RETRY_BASE_MS, APPLY_RETRY_STEPS, TARGET_SECRET_NAME};
use crate::observability::Observability;
use crate::vault::SecretSet;

use super::store::{KubeTargetStore, TargetStore};

/// Publish failure taxonomy. Conflicts are retried internally and only
/// surface as [`ApplyError::RetriesExhausted`]; everything else
/// propagates immediately without further retries.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to create secret {name} in {namespace}")]
    CreateRejected {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to get latest version of secret {name} in {namespace}")]
    FetchBeforeUpdate {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to update secret {name} in {namespace}")]
    UpdateRejected {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error(
        "conflict retry budget exhausted after {attempts} attempts updating secret {name} in {namespace}"
    )]
    RetriesExhausted {
        namespace: String,
        name: String,
        attempts: u32,
        #[source]
        source: kube::Error,
    },
}

/// Idempotently applies a secret set to the target namespace.
pub struct Publisher {
    store: Arc<dyn TargetStore>,
    namespace: String,
    obs: Observability,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("namespace", &self.namespace)
            .field("obs", &self.obs)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    pub fn new(store: Arc<dyn TargetStore>, namespace: &str, obs: Observability) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            obs,
        }
    }

    pub fn with_kube(client: kube::Client, namespace: &str, obs: Observability) -> Self {
        Self::new(
            Arc::new(KubeTargetStore::new(client, namespace)),
            namespace,
            obs,
        )
    }

    /// Create the target secret, or update it in place if it already
    /// exists.
    ///
    /// Applying the same data twice converges on a single object whose
    /// data equals the input: the second apply hits the update path and
    /// rewrites identical data.
    ///
    /// # Errors
    ///
    /// See [`ApplyError`]; conflicts are retried with exponential backoff
    /// before surfacing.
    pub async fn apply(&self, data: &SecretSet) -> Result<(), ApplyError> {
        let span = self.obs.span("ApplySecret");
        async {
            let secret = build_secret(&self.namespace, data);

            info!(name = TARGET_SECRET_NAME, namespace = %self.namespace, "creating secret");
            match self.store.create(&secret).await {
                Ok(_) => {
                    info!("applied secret");
                    Ok(())
                }
                Err(err) if is_already_exists(&err) => {
                    info!("secret already exists, updating in place");
                    self.update_with_retry(&secret).await
                }
                Err(source) => Err(ApplyError::CreateRejected {
                    namespace: self.namespace.clone(),
                    name: TARGET_SECRET_NAME.to_string(),
                    source,
                }),
            }
        }
        .instrument(span)
        .await
    }

    /// Bounded conflict-retry loop. The current object is re-read on
    /// every attempt; a read from a previous attempt is never reused,
    /// since another writer may have moved the object in between.
    async fn update_with_retry(&self, desired: &Secret) -> Result<(), ApplyError> {
        let mut delay = Duration::from_millis(APPLY_RETRY_BASE_MS);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut current = self.store.get(TARGET_SECRET_NAME).await.map_err(|source| {
                ApplyError::FetchBeforeUpdate {
                    namespace: self.namespace.clone(),
                    name: TARGET_SECRET_NAME.to_string(),
                    source,
                }
            })?;

            // Overwrite only the data field; everything server-managed
            // (resourceVersion, uid, labels) rides along from the fresh
            // read.
            current.data.clone_from(&desired.data);

            match self.store.update(&current).await {
                Ok(_) => {
                    info!(attempt, "applied secret");
                    return Ok(());
                }
                Err(source) if is_conflict(&source) => {
                    if attempt >= APPLY_RETRY_STEPS {
                        return Err(ApplyError::RetriesExhausted {
                            namespace: self.namespace.clone(),
                            name: TARGET_SECRET_NAME.to_string(),
                            attempts: attempt,
                            source,
                        });
                    }
                    warn!(attempt, "conflicting write detected, retrying with fresh read");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(source) => {
                    return Err(ApplyError::UpdateRejected {
                        namespace: self.namespace.clone(),
                        name: TARGET_SECRET_NAME.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

/// Build the target object. Values are binary-safe bytes.
fn build_secret(namespace: &str, data: &SecretSet) -> Secret {
    let bytes: BTreeMap<String, ByteString> = data
        .iter()
        .map(|(key, value)| (key.clone(), ByteString(value.clone().into_bytes())))
        .collect();

    Secret {
        metadata: ObjectMeta {
            name: Some(TARGET_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(bytes),
        ..Secret::default()
    }
}

fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists")
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 409 && response.reason == "Conflict")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use kube::core::ErrorResponse;

    use super::*;

    fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    /// In-memory target store with injectable conflict and failure
    /// behavior.
    #[derive(Default)]
    struct MockTargetStore {
        objects: Mutex<HashMap<String, Secret>>,
        get_calls: AtomicU32,
        update_conflicts: AtomicU32,
        deny_updates: bool,
        fail_gets: bool,
    }

    impl MockTargetStore {
        fn with_conflicts(count: u32) -> Self {
            Self {
                update_conflicts: AtomicU32::new(count),
                ..Self::default()
            }
        }

        fn seed(&self, secret: Secret) {
            let name = secret.metadata.name.clone().unwrap_or_default();
            self.objects.lock().unwrap().insert(name, secret);
        }

        fn object(&self, name: &str) -> Option<Secret> {
            self.objects.lock().unwrap().get(name).cloned()
        }

        fn object_count(&self) -> usize {
            self.objects.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TargetStore for MockTargetStore {
        async fn get(&self, name: &str) -> Result<Secret, kube::Error> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_gets {
                return Err(api_error(500, "InternalError", "boom"));
            }
            self.object(name)
                .ok_or_else(|| api_error(404, "NotFound", "secret not found"))
        }

        async fn create(&self, secret: &Secret) -> Result<Secret, kube::Error> {
            let name = secret.metadata.name.clone().unwrap_or_default();
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(&name) {
                return Err(api_error(409, "AlreadyExists", "secret already exists"));
            }
            objects.insert(name, secret.clone());
            Ok(secret.clone())
        }

        async fn update(&self, secret: &Secret) -> Result<Secret, kube::Error> {
            if self
                .update_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(api_error(409, "Conflict", "object has been modified"));
            }
            if self.deny_updates {
                return Err(api_error(403, "Forbidden", "permission denied"));
            }
            let name = secret.metadata.name.clone().unwrap_or_default();
            self.objects.lock().unwrap().insert(name, secret.clone());
            Ok(secret.clone())
        }
    }

    fn set(pairs: &[(&str, &str)]) -> SecretSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn publisher(store: Arc<MockTargetStore>) -> Publisher {
        Publisher::new(store, "default", Observability::disabled())
    }

    fn stored_value(secret: &Secret, key: &str) -> Option<Vec<u8>> {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|bytes| bytes.0.clone())
    }

    #[tokio::test]
    async fn apply_creates_object_with_data() {
        let store = Arc::new(MockTargetStore::default());
        publisher(Arc::clone(&store))
            .apply(&set(&[("API_KEY", "abc")]))
            .await
            .unwrap();

        assert_eq!(store.object_count(), 1);
        let secret = store.object(TARGET_SECRET_NAME).unwrap();
        assert_eq!(stored_value(&secret, "API_KEY"), Some(b"abc".to_vec()));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn apply_twice_is_idempotent() {
        let store = Arc::new(MockTargetStore::default());
        let publisher = publisher(Arc::clone(&store));

        publisher.apply(&set(&[("API_KEY", "abc")])).await.unwrap();
        publisher.apply(&set(&[("API_KEY", "abc")])).await.unwrap();

        assert_eq!(store.object_count(), 1);
        let secret = store.object(TARGET_SECRET_NAME).unwrap();
        assert_eq!(stored_value(&secret, "API_KEY"), Some(b"abc".to_vec()));
    }

    #[tokio::test]
    async fn preexisting_object_routes_through_update() {
        let store = Arc::new(MockTargetStore::default());
        store.seed(build_secret("default", &set(&[("OLD", "old")])));

        publisher(Arc::clone(&store))
            .apply(&set(&[("NEW", "new")]))
            .await
            .unwrap();

        let secret = store.object(TARGET_SECRET_NAME).unwrap();
        assert_eq!(stored_value(&secret, "NEW"), Some(b"new".to_vec()));
        assert!(stored_value(&secret, "OLD").is_none());
        assert_eq!(store.object_count(), 1);
    }

    #[tokio::test]
    async fn conflicts_are_retried_with_a_fresh_read_each_attempt() {
        let store = Arc::new(MockTargetStore::with_conflicts(2));
        store.seed(build_secret("default", &set(&[("OLD", "old")])));

        publisher(Arc::clone(&store))
            .apply(&set(&[("NEW", "new")]))
            .await
            .unwrap();

        // Three update attempts ran; each one re-read the object first.
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 3);
        let secret = store.object(TARGET_SECRET_NAME).unwrap();
        assert_eq!(stored_value(&secret, "NEW"), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_wraps_the_conflict() {
        let store = Arc::new(MockTargetStore::with_conflicts(u32::MAX));
        store.seed(build_secret("default", &set(&[("OLD", "old")])));

        let err = publisher(Arc::clone(&store))
            .apply(&set(&[("NEW", "new")]))
            .await
            .unwrap_err();

        match err {
            ApplyError::RetriesExhausted { attempts, .. } => {
                assert_eq!(attempts, APPLY_RETRY_STEPS);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(
            store.get_calls.load(Ordering::SeqCst),
            APPLY_RETRY_STEPS
        );
    }

    #[tokio::test]
    async fn non_conflict_update_failure_propagates_immediately() {
        let store = Arc::new(MockTargetStore {
            deny_updates: true,
            ..MockTargetStore::default()
        });
        store.seed(build_secret("default", &set(&[("OLD", "old")])));

        let err = publisher(Arc::clone(&store))
            .apply(&set(&[("NEW", "new")]))
            .await
            .unwrap_err();

        assert!(matches!(err, ApplyError::UpdateRejected { .. }));
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_failure_before_update_propagates() {
        let store = Arc::new(MockTargetStore {
            fail_gets: true,
            ..MockTargetStore::default()
        });
        store.seed(build_secret("default", &set(&[("OLD", "old")])));

        let err = publisher(Arc::clone(&store))
            .apply(&set(&[("NEW", "new")]))
            .await
            .unwrap_err();

        assert!(matches!(err, ApplyError::FetchBeforeUpdate { .. }));
    }

    #[tokio::test]
    async fn values_are_binary_safe() {
        let store = Arc::new(MockTargetStore::default());
        let mut data = SecretSet::new();
        data.insert("CERT".to_string(), "line1\nline2\u{0}".to_string());

        publisher(Arc::clone(&store)).apply(&data).await.unwrap();

        let secret = store.object(TARGET_SECRET_NAME).unwrap();
        assert_eq!(
            stored_value(&secret, "CERT"),
            Some("line1\nline2\u{0}".as_bytes().to_vec())
        );
    }
}
