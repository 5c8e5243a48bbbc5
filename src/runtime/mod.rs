//! # Runtime Initialization
//!
//! Process bootstrap: rustls crypto provider and the tracing subscriber.
//!
//! The subscriber must come up before configuration loads so that
//! configuration errors are reported through it; this module therefore
//! reads `ENVIRONMENT` directly rather than waiting for
//! [`crate::config::Config`].

use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize the process runtime.
///
/// Installs the ring crypto provider (required for rustls 0.23+ before any
/// TLS usage) and a tracing subscriber. The production environment logs
/// JSON at WARN by default; everything else logs human-readable output at
/// TRACE. `RUST_LOG` overrides either default.
///
/// # Errors
///
/// Returns an error if a rustls crypto provider was already installed.
pub fn init() -> Result<()> {
    // Must run synchronously before any async operation that uses rustls.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    let environment =
        std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    if environment == "production" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| "vault_sync=warn".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| "vault_sync=trace".into()),
            )
            .init();
    }

    info!(environment = %environment, "starting vault-sync");

    Ok(())
}
