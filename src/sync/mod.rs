//! # Sync Orchestration
//!
//! The top-level sequence: authenticate, verify the configured engines,
//! fetch their secret sets, merge, and publish. The first unrecoverable
//! error halts the run; nothing is published after an upstream failure.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::{debug, info, warn, Instrument};

use crate::config::Config;
use crate::k8s::Publisher;
use crate::merge::merge;
use crate::observability::Observability;
use crate::vault::{SecretSet, VaultClient, VaultError};

/// Fetch the secret set of every engine, keyed by engine path.
///
/// # Errors
///
/// The first failing engine aborts the fetch; its error carries the
/// engine path.
pub async fn fetch_secrets(
    client: &VaultClient,
    engines: &[String],
) -> Result<BTreeMap<String, SecretSet>, VaultError> {
    let span = client.observability().span("GetSecrets");
    async {
        let mut secrets = BTreeMap::new();
        for engine in engines {
            debug!(engine = %engine, "getting secret for engine");
            let set = client.secret_from_vault(engine).await?;
            secrets.insert(engine.clone(), set);
        }
        Ok(secrets)
    }
    .instrument(span)
    .await
}

/// Fetch the current version counter of every engine, keyed by engine
/// path.
///
/// # Errors
///
/// The first failing engine aborts the fetch.
pub async fn fetch_versions(
    client: &VaultClient,
    engines: &[String],
) -> Result<BTreeMap<String, i64>, VaultError> {
    let span = client.observability().span("GetSecretVersions");
    async {
        let mut versions = BTreeMap::new();
        for engine in engines {
            let version = client.secret_version_from_vault(engine).await?;
            versions.insert(engine.clone(), version);
        }
        Ok(versions)
    }
    .instrument(span)
    .await
}

/// Convert a KV v2 data path to the metadata parent used for listing.
///
/// ie `staging/applications/data/foo/dotenv` ->
/// `staging/applications/metadata/foo`
pub fn translate_metadata_path(path: &str) -> String {
    let parts: Vec<&str> = path
        .split('/')
        .map(|part| if part == "data" { "metadata" } else { part })
        .collect();

    parts[..parts.len().saturating_sub(1)].join("/")
}

/// The final path segment of an engine path.
///
/// ie `staging/applications/data/foo/dotenv` -> `dotenv`
pub fn secret_leaf(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Verify the configured engines exist before fetching.
///
/// The default engine must verify; a configured override engine that
/// cannot be verified is skipped with a warning so a missing staging
/// override never blocks a deploy.
///
/// # Errors
///
/// Propagates the listing failure for the default engine.
pub async fn verified_engines(
    client: &VaultClient,
    config: &Config,
) -> Result<Vec<String>, VaultError> {
    let default_parent = translate_metadata_path(&config.default_engine);
    debug!(path = %default_parent, "verifying engine exists for path");
    client.engines_from_vault(&default_parent).await?;

    let mut engines = vec![config.default_engine.clone()];

    if let Some(override_engine) = &config.override_engine {
        let override_parent = translate_metadata_path(override_engine);
        debug!(path = %override_parent, "verifying engine exists for path");
        match client.engines_from_vault(&override_parent).await {
            Ok(_) => engines.push(override_engine.clone()),
            Err(err) => {
                warn!(engine = %override_engine, error = %err, "cannot verify override engine, skipping");
            }
        }
    }

    Ok(engines)
}

/// Run one full sync: Config -> Auth -> Client -> fetch -> merge ->
/// publish.
///
/// # Errors
///
/// Surfaces the first unrecoverable error from any stage.
pub async fn run(config: &Config) -> Result<()> {
    let obs = Observability::new(config.trace_enabled, &config.trace_prefix);

    let client = VaultClient::new(config, obs.clone())
        .await
        .context("initialize vault client")?;

    let engines = verified_engines(&client, config)
        .await
        .context("verify engines")?;

    info!(engines = ?engines, "getting vault secrets from verified engines");
    let secrets = fetch_secrets(&client, &engines)
        .await
        .context("get secrets from vault")?;

    let defaults = secrets
        .get(&config.default_engine)
        .with_context(|| format!("default engine {} missing from fetch", config.default_engine))?;
    let overrides = config
        .override_engine
        .as_ref()
        .and_then(|engine| secrets.get(engine));

    let merged = merge(defaults, overrides);

    info!(
        namespace = %config.namespace,
        count = merged.len(),
        "applying merged secrets to namespace"
    );

    let kube_client = kube::Client::try_default()
        .await
        .context("create kubernetes client")?;
    let publisher = Publisher::with_kube(kube_client, &config.namespace, obs);
    publisher
        .apply(&merged)
        .await
        .with_context(|| format!("apply secret to namespace {}", config.namespace))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_replaces_data_and_drops_leaf() {
        assert_eq!(
            translate_metadata_path("staging/applications/data/foo/dotenv"),
            "staging/applications/metadata/foo"
        );
    }

    #[test]
    fn translate_handles_paths_without_data_segment() {
        assert_eq!(translate_metadata_path("kv/foo/bar"), "kv/foo");
    }

    #[test]
    fn translate_single_segment_yields_empty_parent() {
        assert_eq!(translate_metadata_path("dotenv"), "");
    }

    #[test]
    fn leaf_is_final_segment() {
        assert_eq!(secret_leaf("staging/applications/data/foo/dotenv"), "dotenv");
        assert_eq!(secret_leaf("dotenv"), "dotenv");
    }
}
