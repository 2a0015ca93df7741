//! Tracing integration for structured logging and spans.

use crate::tag::{Instance, Tag};
use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether coordinators open a span per unit of work.
    pub coordinator_spans: bool,
    /// Whether each transferred product gets its own span.
    pub product_spans: bool,
    /// Default span level.
    pub level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            coordinator_spans: true,
            product_spans: false, // One span per message adds up quickly
            level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// Create a config with all spans enabled.
    pub fn all() -> Self {
        Self {
            coordinator_spans: true,
            product_spans: true,
            level: Level::DEBUG,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            coordinator_spans: false,
            product_spans: false,
            level: Level::INFO,
        }
    }

    /// Span for one unit of work, or a disabled span if coordinator spans are off.
    pub fn coordinator_span(&self, name: &str, role: &str, instance: Instance) -> Span {
        if self.coordinator_spans {
            span_coordinator(name, role, instance)
        } else {
            Span::none()
        }
    }

    /// Span for one product transfer, or a disabled span if product spans are off.
    pub fn product_span(&self, product: &str, transfer: &str) -> Span {
        if self.product_spans {
            span!(Level::DEBUG, "product", product = %product, transfer = %transfer)
        } else {
            Span::none()
        }
    }
}

/// Create a span for one coordinator invocation.
///
/// # Example
///
/// ```rust,ignore
/// use parallax_bridge::observability::span_coordinator;
///
/// let span = span_coordinator("send", "sender", instance);
/// let _guard = span.enter();
/// // Transfers here...
/// ```
#[inline]
pub fn span_coordinator(name: &str, role: &str, instance: Instance) -> Span {
    span!(
        Level::INFO,
        "coordinator",
        name = %name,
        role = %role,
        instance = %instance
    )
}

/// Log a message handed to the transport.
#[inline]
pub fn trace_send(tag: Tag, size: usize) {
    tracing::trace!(tag = %tag, size = size, "send");
}

/// Log a message taken from the transport.
#[inline]
pub fn trace_receive(tag: Tag, size: usize) {
    tracing::trace!(tag = %tag, size = size, "receive");
}

/// Log an error.
#[inline]
pub fn trace_error(coordinator: &str, error: &dyn std::error::Error) {
    tracing::error!(
        coordinator = %coordinator,
        error = %error,
        "transfer failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::MessageKind;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(config.coordinator_spans);
        assert!(!config.product_spans);
    }

    #[test]
    fn test_tracing_config_none() {
        let config = TracingConfig::none();
        assert!(config.coordinator_span("recv", "receiver", Instance::from_raw(1)).is_none());
        assert!(config.product_span("hits", "serialized").is_none());
    }

    #[test]
    fn test_trace_functions() {
        let tag = Tag::encode(MessageKind::Empty, Instance::BOOTSTRAP);
        trace_send(tag, 4);
        trace_receive(tag, 4);
        let _span = span_coordinator("send", "sender", Instance::from_raw(7));
    }
}
