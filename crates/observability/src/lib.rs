//! Tracing setup and the injected soft-failure sink.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Structured soft-failure events and their sinks.
pub mod observer;

pub use observer::{Observer, RecordingObserver, SoftFailure, Stage, TracingObserver};
