//! Vault Sync Library
//!
//! Core functionality for syncing versioned secrets from HashiCorp Vault
//! into Kubernetes Secrets.
//!
//! The sync pipeline is: load configuration from the environment,
//! authenticate to Vault (GCP federated identity or a GitHub access token),
//! read the default and optional override engines, merge them with
//! override-wins precedence, and publish the result as a namespaced
//! Kubernetes Secret using create-or-update with conflict retry.

pub mod config;
pub mod constants;
pub mod k8s;
pub mod merge;
pub mod observability;
pub mod runtime;
pub mod sync;
pub mod vault;
