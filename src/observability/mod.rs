//! Observability features: metrics and tracing.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `bridge_messages_sent` | Counter | Transport messages sent, by message kind |
//! | `bridge_bytes_sent` | Counter | Payload bytes sent, by message kind |
//! | `bridge_messages_received` | Counter | Transport messages received, by message kind |
//! | `bridge_bytes_received` | Counter | Payload bytes received, by message kind |
//! | `bridge_units_processed` | Counter | Units of work handled, by coordinator |
//! | `bridge_products_transferred` | Counter | Products moved, by coordinator and transfer kind |
//! | `bridge_unit_time_ns` | Histogram | Time spent per unit of work |
//!
//! No exporter is installed by the library; plug in any `metrics` recorder.
//!
//! ## Tracing
//!
//! Coordinators open a span per unit of work carrying their name, role and
//! instance. Every message sent or received on a channel emits a `trace`
//! event with its tag and size.

mod metrics;
mod tracing_support;

pub use metrics::{
    CoordinatorMetrics, TimerGuard, init_metrics, record_message_received, record_message_sent,
};
pub use tracing_support::{
    TracingConfig, span_coordinator, trace_error, trace_receive, trace_send,
};
