//! Soft-failure reporting.
//!
//! A soft failure is recorded for observability but never changes the outcome
//! reported to the caller (e.g. a counter refresh that could not reach the
//! cache, or an audit message that failed to publish). Components receive an
//! `Observer` at construction instead of logging through ambient global state,
//! so tests can assert on exactly what was emitted.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use goods_core::{GoodId, ProjectId};

/// Pipeline step where a soft failure happened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading a single good from the cache.
    EntityCacheRead,
    /// Populating the cache after a store read.
    EntityCacheFill,
    /// Writing a freshly created good into the cache.
    EntityCacheWrite,
    /// Dropping a good's cache entry after a mutation.
    EntityCacheInvalidate,
    /// Reading an aggregate counter from the cache.
    CounterRead,
    /// Writing a recomputed counter back to the cache.
    CounterRefresh,
    /// Dropping the aggregate counters after a mutation.
    CounterInvalidate,
    /// Handing an audit event to the bus.
    AuditPublish,
    /// Decoding a message received by the audit consumer.
    AuditDecode,
    /// Appending an audit event to the sink.
    AuditAppend,
    /// Sink append exceeded the per-message timeout.
    AuditTimeout,
    /// The audit subscription lost its connection and is reconnecting.
    AuditSubscribe,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::EntityCacheRead => "entity_cache_read",
            Stage::EntityCacheFill => "entity_cache_fill",
            Stage::EntityCacheWrite => "entity_cache_write",
            Stage::EntityCacheInvalidate => "entity_cache_invalidate",
            Stage::CounterRead => "counter_read",
            Stage::CounterRefresh => "counter_refresh",
            Stage::CounterInvalidate => "counter_invalidate",
            Stage::AuditPublish => "audit_publish",
            Stage::AuditDecode => "audit_decode",
            Stage::AuditAppend => "audit_append",
            Stage::AuditTimeout => "audit_timeout",
            Stage::AuditSubscribe => "audit_subscribe",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record of a failure that was absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftFailure {
    pub stage: Stage,
    pub operation: &'static str,
    pub good_id: Option<GoodId>,
    pub project_id: Option<ProjectId>,
    pub error: String,
    pub at: DateTime<Utc>,
}

impl SoftFailure {
    pub fn new(stage: Stage, operation: &'static str, error: impl core::fmt::Display) -> Self {
        Self {
            stage,
            operation,
            good_id: None,
            project_id: None,
            error: error.to_string(),
            at: Utc::now(),
        }
    }

    pub fn with_good(mut self, good_id: GoodId, project_id: ProjectId) -> Self {
        self.good_id = Some(good_id);
        self.project_id = Some(project_id);
        self
    }
}

/// Sink for soft failures.
pub trait Observer: Send + Sync {
    fn soft_failure(&self, failure: SoftFailure);
}

impl<O> Observer for Arc<O>
where
    O: Observer + ?Sized,
{
    fn soft_failure(&self, failure: SoftFailure) {
        (**self).soft_failure(failure)
    }
}

/// Forwards soft failures to `tracing` as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn soft_failure(&self, failure: SoftFailure) {
        ::tracing::warn!(
            stage = failure.stage.as_str(),
            operation = failure.operation,
            good_id = failure.good_id.map(|id| id.get()),
            project_id = failure.project_id.map(|id| id.get()),
            error = %failure.error,
            "soft failure absorbed"
        );
    }
}

/// Keeps soft failures in memory (tests).
#[derive(Debug, Default)]
pub struct RecordingObserver {
    inner: Mutex<Vec<SoftFailure>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<SoftFailure> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.inner
            .lock()
            .map(|v| v.iter().filter(|f| f.stage == stage).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().map(|v| v.is_empty()).unwrap_or(true)
    }
}

impl Observer for RecordingObserver {
    fn soft_failure(&self, failure: SoftFailure) {
        if let Ok(mut v) = self.inner.lock() {
            v.push(failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_observer_counts_per_stage() {
        let observer = RecordingObserver::new();
        observer.soft_failure(SoftFailure::new(Stage::CounterRefresh, "total_count", "down"));
        observer.soft_failure(
            SoftFailure::new(Stage::AuditPublish, "create", "closed")
                .with_good(GoodId::from_raw(1), ProjectId::from_raw(2)),
        );

        assert_eq!(observer.count(Stage::CounterRefresh), 1);
        assert_eq!(observer.count(Stage::AuditPublish), 1);
        assert_eq!(observer.count(Stage::AuditAppend), 0);

        let published = &observer.failures()[1];
        assert_eq!(published.good_id, Some(GoodId::from_raw(1)));
        assert_eq!(published.error, "closed");
    }

    #[test]
    fn shared_observer_through_arc() {
        let observer = Arc::new(RecordingObserver::new());
        let as_dyn: Arc<dyn Observer> = observer.clone();
        as_dyn.soft_failure(SoftFailure::new(Stage::AuditDecode, "consume", "bad json"));
        assert!(!observer.is_empty());
    }
}
