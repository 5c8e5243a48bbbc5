//! # vault-sync
//!
//! One-shot job that syncs versioned secrets from HashiCorp Vault into a
//! Kubernetes Secret.
//!
//! 1. **Authenticate** - GCP federated identity (signed JWT) or a GitHub
//!    access token, selected from the environment
//! 2. **Fetch** - reads the default engine and an optional override engine
//!    from Vault's KV v2 API
//! 3. **Merge** - override-wins union of the two secret sets
//! 4. **Publish** - creates or updates the `vault-secret` object in the
//!    target namespace, retrying write conflicts with fresh reads
//!
//! All configuration is environment-driven; see `config` for the full
//! variable list.

use anyhow::{Context, Result};
use vault_sync::{config::Config, runtime, sync};

#[tokio::main]
async fn main() -> Result<()> {
    runtime::init()?;

    let config = Config::from_env().context("load configuration from environment")?;

    if let Err(err) = sync::run(&config).await {
        tracing::error!(error = ?err, "sync run failed");
        return Err(err);
    }

    Ok(())
}
