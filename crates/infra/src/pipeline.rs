//! Side-effect pipeline run after every committed primary store write.
//!
//! ```text
//! store write (committed)
//!   ↓
//! cache step(s)      hard or soft, per stage
//!   ↓
//! audit publication  always soft
//! ```
//!
//! A hard failure is returned to the caller. A soft failure is reported to the
//! injected `Observer` and the step is treated as skipped. The severity of a
//! step is a property of its `Stage`, fixed in `severity`.

use std::sync::Arc;

use goods_core::{Good, GoodId, ProjectId};
use goods_events::MutationKind;
use goods_observability::{Observer, SoftFailure, Stage};

use crate::audit::AuditPublisher;
use crate::cache::CacheError;
use crate::ordering_engine::EngineError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    /// Surfaced to the caller.
    Hard,
    /// Reported to the observer, never surfaced.
    Soft,
}

pub fn severity(stage: Stage) -> Severity {
    match stage {
        // Entity entries must never be stale after a confirmed write.
        Stage::EntityCacheFill | Stage::EntityCacheWrite | Stage::EntityCacheInvalidate => {
            Severity::Hard
        }
        Stage::EntityCacheRead
        | Stage::CounterRead
        | Stage::CounterRefresh
        | Stage::CounterInvalidate
        | Stage::AuditPublish
        | Stage::AuditDecode
        | Stage::AuditAppend
        | Stage::AuditTimeout
        | Stage::AuditSubscribe => Severity::Soft,
    }
}

/// Applies the severity table to step outcomes.
#[derive(Clone)]
pub struct SideEffects {
    observer: Arc<dyn Observer>,
    publisher: AuditPublisher,
}

impl core::fmt::Debug for SideEffects {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SideEffects")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl SideEffects {
    pub fn new(observer: Arc<dyn Observer>, publisher: AuditPublisher) -> Self {
        Self {
            observer,
            publisher,
        }
    }

    /// Settle the outcome of a cache step.
    ///
    /// `Ok(Some(v))` on success, `Ok(None)` for an absorbed soft failure,
    /// `Err` for a hard one.
    pub fn cache_step<T>(
        &self,
        stage: Stage,
        operation: &'static str,
        target: Option<&Good>,
        outcome: Result<T, CacheError>,
    ) -> Result<Option<T>, EngineError> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(source) => match severity(stage) {
                Severity::Hard => Err(EngineError::Cache { stage, source }),
                Severity::Soft => {
                    self.report(stage, operation, target.map(|g| (g.id, g.project_id)), source);
                    Ok(None)
                }
            },
        }
    }

    /// Publish the audit snapshot of `good`. Returns whether the bus accepted it.
    pub fn audit_step(&self, kind: MutationKind, operation: &'static str, good: &Good) -> bool {
        match self.publisher.publish(kind, good) {
            Ok(_) => true,
            Err(err) => {
                self.report(Stage::AuditPublish, operation, Some((good.id, good.project_id)), err);
                false
            }
        }
    }

    fn report(
        &self,
        stage: Stage,
        operation: &'static str,
        target: Option<(GoodId, ProjectId)>,
        error: impl core::fmt::Display,
    ) {
        let mut failure = SoftFailure::new(stage, operation, error);
        if let Some((good_id, project_id)) = target {
            failure = failure.with_good(good_id, project_id);
        }
        self.observer.soft_failure(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use goods_core::Priority;
    use goods_events::InMemoryEventBus;
    use goods_observability::RecordingObserver;

    fn effects() -> (SideEffects, Arc<RecordingObserver>, Arc<InMemoryEventBus>) {
        let observer = Arc::new(RecordingObserver::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let effects = SideEffects::new(observer.clone(), AuditPublisher::new(bus.clone()));
        (effects, observer, bus)
    }

    fn good() -> Good {
        Good {
            id: GoodId::from_raw(1),
            project_id: ProjectId::from_raw(1),
            name: "Rug".to_string(),
            description: String::new(),
            priority: Priority::from_raw(1),
            removed: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn entity_cache_writes_are_hard_everything_else_soft() {
        let hard = [
            Stage::EntityCacheFill,
            Stage::EntityCacheWrite,
            Stage::EntityCacheInvalidate,
        ];
        for stage in hard {
            assert_eq!(severity(stage), Severity::Hard, "{stage}");
        }
        let soft = [
            Stage::EntityCacheRead,
            Stage::CounterRead,
            Stage::CounterRefresh,
            Stage::CounterInvalidate,
            Stage::AuditPublish,
            Stage::AuditDecode,
            Stage::AuditAppend,
            Stage::AuditTimeout,
            Stage::AuditSubscribe,
        ];
        for stage in soft {
            assert_eq!(severity(stage), Severity::Soft, "{stage}");
        }
    }

    #[test]
    fn hard_step_failure_is_returned() {
        let (effects, observer, _) = effects();
        let err = effects
            .cache_step::<()>(
                Stage::EntityCacheInvalidate,
                "update",
                Some(&good()),
                Err(CacheError::Unavailable("down".to_string())),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Cache {
                stage: Stage::EntityCacheInvalidate,
                ..
            }
        ));
        assert!(observer.is_empty());
    }

    #[test]
    fn soft_step_failure_is_observed_and_skipped() {
        let (effects, observer, _) = effects();
        let settled = effects
            .cache_step::<()>(
                Stage::CounterInvalidate,
                "create",
                Some(&good()),
                Err(CacheError::Unavailable("down".to_string())),
            )
            .unwrap();
        assert_eq!(settled, None);
        assert_eq!(observer.count(Stage::CounterInvalidate), 1);
        assert_eq!(observer.failures()[0].operation, "create");
    }

    #[test]
    fn rejected_publish_is_observed() {
        let (effects, observer, bus) = effects();
        bus.set_reject_publishes(true);
        assert!(!effects.audit_step(MutationKind::Created, "create", &good()));
        assert_eq!(observer.count(Stage::AuditPublish), 1);
    }
}
