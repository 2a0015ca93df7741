//! Metrics collection using metrics-rs.

use crate::tag::MessageKind;
use metrics::{Counter, Histogram, Unit, counter, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const MESSAGES_SENT: &str = "bridge_messages_sent";
const BYTES_SENT: &str = "bridge_bytes_sent";
const MESSAGES_RECEIVED: &str = "bridge_messages_received";
const BYTES_RECEIVED: &str = "bridge_bytes_received";
const UNITS_PROCESSED: &str = "bridge_units_processed";
const PRODUCTS_TRANSFERRED: &str = "bridge_products_transferred";
const UNIT_TIME_NS: &str = "bridge_unit_time_ns";

/// Initialize metrics descriptions.
///
/// Call this once at application startup before using any metrics.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(MESSAGES_SENT, Unit::Count, "Transport messages sent");
    metrics::describe_counter!(BYTES_SENT, Unit::Bytes, "Payload bytes sent");
    metrics::describe_counter!(
        MESSAGES_RECEIVED,
        Unit::Count,
        "Transport messages received"
    );
    metrics::describe_counter!(BYTES_RECEIVED, Unit::Bytes, "Payload bytes received");
    metrics::describe_counter!(
        UNITS_PROCESSED,
        Unit::Count,
        "Units of work handled by a coordinator"
    );
    metrics::describe_counter!(
        PRODUCTS_TRANSFERRED,
        Unit::Count,
        "Products sent or received by a coordinator"
    );
    metrics::describe_histogram!(
        UNIT_TIME_NS,
        Unit::Nanoseconds,
        "Time spent transferring one unit of work"
    );
}

/// Record a message handed to the transport.
#[inline]
pub fn record_message_sent(kind: MessageKind, bytes: usize) {
    counter!(MESSAGES_SENT, "kind" => kind.as_str()).increment(1);
    counter!(BYTES_SENT, "kind" => kind.as_str()).increment(bytes as u64);
}

/// Record a message received from the transport.
#[inline]
pub fn record_message_received(kind: MessageKind, bytes: usize) {
    counter!(MESSAGES_RECEIVED, "kind" => kind.as_str()).increment(1);
    counter!(BYTES_RECEIVED, "kind" => kind.as_str()).increment(bytes as u64);
}

/// Metrics collector for one coordinator.
///
/// Provides a convenient way to record metrics with pre-configured labels.
#[derive(Clone)]
pub struct CoordinatorMetrics {
    coordinator: String,
    units: Counter,
    trivial_copy: Counter,
    serialized: Counter,
    unit_time: Histogram,
}

impl std::fmt::Debug for CoordinatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorMetrics")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl CoordinatorMetrics {
    /// Create a collector labelled with the coordinator name and role
    /// (`"sender"` or `"receiver"`).
    pub fn new(coordinator: &str, role: &'static str) -> Self {
        let name = coordinator.to_string();
        Self {
            coordinator: name.clone(),
            units: counter!(UNITS_PROCESSED, "coordinator" => name.clone(), "role" => role),
            trivial_copy: counter!(
                PRODUCTS_TRANSFERRED,
                "coordinator" => name.clone(),
                "role" => role,
                "transfer" => "trivial-copy"
            ),
            serialized: counter!(
                PRODUCTS_TRANSFERRED,
                "coordinator" => name.clone(),
                "role" => role,
                "transfer" => "serialized"
            ),
            unit_time: histogram!(UNIT_TIME_NS, "coordinator" => name, "role" => role),
        }
    }

    /// Record a completed unit of work.
    #[inline]
    pub fn record_unit(&self) {
        self.units.increment(1);
    }

    /// Record one transferred product.
    #[inline]
    pub fn record_product(&self, serialized: bool) {
        if serialized {
            self.serialized.increment(1);
        } else {
            self.trivial_copy.increment(1);
        }
    }

    /// Record the time spent on one unit.
    #[inline]
    pub fn record_time(&self, duration: Duration) {
        self.unit_time.record(duration.as_nanos() as f64);
    }

    /// Start a timer and return a guard that records on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    /// Get the coordinator name.
    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }
}

/// Guard that records the unit time when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a CoordinatorMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_time(self.start.elapsed());
    }
}
