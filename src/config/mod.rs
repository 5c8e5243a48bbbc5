//! # Configuration
//!
//! The single configuration boundary. Every setting is resolved from
//! environment variables here, validated once, and handed to the rest of
//! the process as an immutable [`Config`]. No other module reads the
//! environment (the logging bootstrap in [`crate::runtime`] is the one
//! exception, since it must come up before configuration errors can be
//! reported).

use std::fmt;

use crate::constants::{DEFAULT_GCP_AUTH_MOUNT, DEFAULT_TRACE_PREFIX};
use thiserror::Error;

/// Configuration validation failure. All variants are fatal and surface
/// before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("set the {0} environment variable")]
    MissingVar(&'static str),
    #[error("the {0} environment variable must not be empty")]
    EmptyVar(&'static str),
    #[error(
        "no authentication mechanism configured: set GITHUB_OAUTH_TOKEN, \
         or GCLOUD_PROJECT and FUNCTION_IDENTITY"
    )]
    NoAuthMechanism,
}

/// Exactly one group of authentication material.
///
/// A GitHub token is preferred when both groups are present in the
/// environment; the GCP group is not consulted in that case.
#[derive(Clone)]
pub enum AuthMaterial {
    /// Federated identity: a JWT signed by the IAM Credentials API on
    /// behalf of the runtime service account.
    Gcp {
        project: String,
        service_account: String,
        /// Mount path of the auth method inside Vault, e.g. `gcp`.
        auth_mount: String,
    },
    /// A pre-provisioned GitHub access token handed straight to Vault.
    Github { token: String },
}

impl fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcp {
                project,
                service_account,
                auth_mount,
            } => f
                .debug_struct("Gcp")
                .field("project", project)
                .field("service_account", service_account)
                .field("auth_mount", auth_mount)
                .finish(),
            Self::Github { .. } => f.debug_struct("Github").field("token", &"[REDACTED]").finish(),
        }
    }
}

/// Validated, immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Vault server address, e.g. `https://vault.example.com:8200`.
    pub vault_addr: String,
    /// Vault role the login assertion is bound to.
    pub vault_role: String,
    /// Whether named trace spans are emitted.
    pub trace_enabled: bool,
    /// Prefix for span names, e.g. `vault` yields `vault/SecretFromVault`.
    pub trace_prefix: String,
    /// Deployment environment; selects the log format in [`crate::runtime`].
    pub environment: String,
    /// Engine path of the default secret set.
    pub default_engine: String,
    /// Engine path of the optional override secret set.
    pub override_engine: Option<String>,
    /// Kubernetes namespace the merged secret is published into.
    pub namespace: String,
    /// Exactly one authentication mechanism.
    pub auth: AuthMaterial,
}

impl Config {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a required variable is missing or
    /// empty, or when neither authentication group is fully specified.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// `from_env` delegates here; tests supply a map-backed lookup so they
    /// never mutate the process environment.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vault_addr = required(lookup, "VAULT_ADDR")?;
        let vault_role = required(lookup, "VAULT_ROLE")?;

        let trace_enabled = lookup("TRACE_ENABLED")
            .map(|v| v.parse::<bool>().unwrap_or(false))
            .unwrap_or(false);
        let trace_prefix = match lookup("TRACE_PREFIX") {
            Some(prefix) if prefix.is_empty() => return Err(ConfigError::EmptyVar("TRACE_PREFIX")),
            Some(prefix) => prefix,
            None => DEFAULT_TRACE_PREFIX.to_string(),
        };

        let environment =
            lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let default_engine = required(lookup, "VAULT_SECRET")?;
        let override_engine = lookup("VAULT_SECRET_OVERRIDE").filter(|v| !v.is_empty());
        let namespace = required(lookup, "K8S_NAMESPACE")?;

        let auth = Self::auth_material(lookup)?;

        Ok(Self {
            vault_addr,
            vault_role,
            trace_enabled,
            trace_prefix,
            environment,
            default_engine,
            override_engine,
            namespace,
            auth,
        })
    }

    /// Resolve exactly one authentication group, preferring a GitHub token.
    fn auth_material(lookup: &dyn Fn(&str) -> Option<String>) -> Result<AuthMaterial, ConfigError> {
        if let Some(token) = lookup("GITHUB_OAUTH_TOKEN").filter(|t| !t.is_empty()) {
            return Ok(AuthMaterial::Github { token });
        }

        let project = lookup("GCLOUD_PROJECT").filter(|v| !v.is_empty());
        // google injects this env var automatically in gcp environments
        let service_account = lookup("FUNCTION_IDENTITY").filter(|v| !v.is_empty());

        match (project, service_account) {
            (Some(project), Some(service_account)) => {
                let auth_mount = lookup("GCP_AUTH_PATH")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_GCP_AUTH_MOUNT.to_string());
                Ok(AuthMaterial::Gcp {
                    project,
                    service_account,
                    auth_mount,
                })
            }
            (Some(_), None) => Err(ConfigError::MissingVar("FUNCTION_IDENTITY")),
            (None, Some(_)) => Err(ConfigError::MissingVar("GCLOUD_PROJECT")),
            (None, None) => Err(ConfigError::NoAuthMechanism),
        }
    }
}

/// Read a variable that must be present and non-empty.
fn required(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    match lookup(name) {
        Some(value) if value.is_empty() => Err(ConfigError::EmptyVar(name)),
        Some(value) => Ok(value),
        None => Err(ConfigError::MissingVar(name)),
    }
}
