//! # Observability
//!
//! Explicit tracing context threaded into the Vault client and the
//! publisher at construction time. Nothing here is global or mutated
//! after construction.
//!
//! Span names follow the `<prefix>/<operation>` convention and are an
//! observable contract: tests assert the exact names through a
//! [`SpanSink`]. At runtime the name is carried on the `otel.name` field
//! so OpenTelemetry-aware subscribers pick it up as the span name.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::Span;

/// Receives every span name as it is created. Implemented by
/// [`RecordingSink`] for tests; production runs without a sink.
pub trait SpanSink: Send + Sync {
    fn record(&self, name: &str);
}

/// Tracing context for store operations.
#[derive(Clone, Default)]
pub struct Observability {
    enabled: bool,
    prefix: String,
    sink: Option<Arc<dyn SpanSink>>,
}

impl fmt::Debug for Observability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observability")
            .field("enabled", &self.enabled)
            .field("prefix", &self.prefix)
            .field("sink", &self.sink.as_ref().map(|_| "Some(..)"))
            .finish()
    }
}

impl Observability {
    pub fn new(enabled: bool, prefix: impl Into<String>) -> Self {
        Self {
            enabled,
            prefix: prefix.into(),
            sink: None,
        }
    }

    /// A context that emits no spans at all.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Attach a sink that observes every span name. Used by tests to
    /// assert the naming contract.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn SpanSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Create the span for one named operation.
    ///
    /// Returns [`Span::none`] when tracing is disabled, so callers can
    /// unconditionally instrument their futures.
    pub fn span(&self, operation: &str) -> Span {
        if !self.enabled {
            return Span::none();
        }

        let name = format!("{}/{}", self.prefix, operation);
        if let Some(sink) = &self.sink {
            sink.record(&name);
        }

        tracing::info_span!("store_operation", otel.name = %name)
    }
}

/// Collects span names in creation order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    names: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of every span name recorded so far, in order.
    pub fn names(&self) -> Vec<String> {
        self.names
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.names
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

impl SpanSink for RecordingSink {
    fn record(&self, name: &str) {
        self.names
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_names_use_prefix_and_operation() {
        let sink = RecordingSink::new();
        let obs = Observability::new(true, "vault").with_sink(Arc::clone(&sink) as Arc<dyn SpanSink>);

        let _create = obs.span("create");
        let _write = obs.span("write");

        assert_eq!(sink.names(), vec!["vault/create", "vault/write"]);
    }

    #[test]
    fn disabled_context_records_nothing() {
        let sink = RecordingSink::new();
        let obs =
            Observability::new(false, "vault").with_sink(Arc::clone(&sink) as Arc<dyn SpanSink>);

        let span = obs.span("create");
        assert!(span.is_none());
        assert!(sink.names().is_empty());
    }
}
