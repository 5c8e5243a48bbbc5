//! # Kubernetes Publisher
//!
//! Publishes a merged secret set as a namespaced Kubernetes `Secret`
//! using create-or-update with conflict retry. The Kubernetes API is the
//! only store this tool drives with optimistic concurrency: every update
//! attempt re-reads the current object before writing, so concurrent
//! publishers converge instead of clobbering each other's resource
//! versions.

mod apply;
mod store;

pub use apply::{ApplyError, Publisher};
pub use store::{KubeTargetStore, TargetStore};
