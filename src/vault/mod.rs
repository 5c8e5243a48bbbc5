//! # Vault Client
//!
//! Client for Vault's KV v2 secrets engine over the REST API.
//!
//! This module provides functionality to:
//! - Authenticate with either GCP federated identity or a GitHub token
//! - Read key/value data and version counters from engine paths
//! - List child entries under a metadata path
//! - Create, update and delete individual keys (full-map copy-on-write)
//!
//! The HTTP surface lives behind the [`api::StoreApi`] trait so the client
//! logic is testable against an in-memory store.

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod gcp;
pub mod types;

pub use auth::{authenticate, AuthStrategy};
pub use client::VaultClient;
pub use error::{AuthError, VaultError};
pub use types::{Credential, SecretSet, WriteReceipt};
