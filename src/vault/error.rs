//! Error taxonomy for authentication and secret operations.
//!
//! Authentication errors are fatal to client construction. Read and write
//! errors carry the engine path involved; nothing is swallowed silently.

use thiserror::Error;

/// Failure while obtaining a bearer token. Never retried; the caller
/// treats any variant as fatal to client construction.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to construct identity http client")]
    Client(#[source] reqwest::Error),

    /// The metadata server or IAM endpoint could not be reached, or the
    /// environment carries no runtime credentials.
    #[error("identity provider unavailable")]
    IdentityProviderUnavailable(#[source] reqwest::Error),

    /// The identity service refused to sign the login assertion.
    #[error("signing jwt for {service_account} failed: {message}")]
    SigningFailed {
        service_account: String,
        message: String,
    },

    #[error("vault login request failed at auth/{mount}/login")]
    LoginRequest {
        mount: String,
        #[source]
        source: reqwest::Error,
    },

    /// Vault rejected the assertion or token; carries Vault's error text.
    #[error("vault login rejected at auth/{mount}/login: {message}")]
    LoginRejected { mount: String, message: String },

    #[error("login response missing auth.client_token")]
    MissingClientToken,
}

/// Failure of a secret store operation.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("failed to construct vault http client")]
    Client(#[source] reqwest::Error),

    #[error("secret values returned from Vault are nil for {engine}")]
    NotFound { engine: String },

    /// The `data.data` sub-object was missing or not a flat string map.
    /// Numeric, boolean, null and nested values are rejected, not coerced.
    #[error("secret data from Vault is not a flat string map for {engine}")]
    MalformedData { engine: String },

    #[error("current version not available for secret {engine}")]
    VersionUnavailable { engine: String },

    #[error("unexpected element type listing {path}, expected string")]
    UnexpectedElement { path: String },

    #[error("key {key} for secret at {engine} already exists")]
    KeyExists { key: String, engine: String },

    #[error("missing key {key} for secret at {engine}")]
    KeyMissing { key: String, engine: String },

    #[error("failed to write data to {engine}")]
    WriteRejected {
        engine: String,
        #[source]
        source: Box<VaultError>,
    },

    #[error("vault request failed for {path}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("vault returned status {status} for {path}: {message}")]
    Api {
        path: String,
        status: u16,
        message: String,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),
}
