//! Audit trail: publishing side and analytical sink.
//!
//! The consuming side (a background worker draining the bus into the sink)
//! lives in `crate::workers::audit_worker`.

pub mod publisher;
pub mod sink;

use std::time::Duration;

use thiserror::Error;

use goods_events::BusError;

pub use publisher::AuditPublisher;
pub use sink::{AuditSink, InMemoryAuditSink, PostgresAuditSink};

/// Per-message deadline for appending to the sink.
pub const DEFAULT_APPEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Audit failures are never fatal to a mutation; they are reported to the
/// observer and dropped.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to encode audit event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish audit event: {0}")]
    Publish(#[from] BusError),

    #[error("audit sink failure: {0}")]
    Sink(String),
}
