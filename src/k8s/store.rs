//! The target object store seam.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};

use crate::constants::TARGET_SECRET_NAME;

/// The three Kubernetes operations the publish protocol needs. The kube
/// client implements it for real clusters; tests use an in-memory store
/// with injectable conflicts.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Secret, kube::Error>;
    async fn create(&self, secret: &Secret) -> Result<Secret, kube::Error>;
    async fn update(&self, secret: &Secret) -> Result<Secret, kube::Error>;
}

/// [`TargetStore`] over a namespaced `Api<Secret>`.
#[derive(Debug, Clone)]
pub struct KubeTargetStore {
    api: Api<Secret>,
}

impl KubeTargetStore {
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl TargetStore for KubeTargetStore {
    async fn get(&self, name: &str) -> Result<Secret, kube::Error> {
        self.api.get(name).await
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        self.api.create(&PostParams::default(), secret).await
    }

    async fn update(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        let name = secret
            .metadata
            .name
            .as_deref()
            .unwrap_or(TARGET_SECRET_NAME);
        self.api
            .replace(name, &PostParams::default(), secret)
            .await
    }
}
