//! Ordering engine: canonical mutations plus the cache/audit contract.
//!
//! ## Mutation Flow
//!
//! ```text
//! Request
//!   ↓
//! 1. Primary store transaction (ordering, soft delete, NotFound checks)
//!   ↓
//! 2. Cache steps (entity invalidation/write: hard; counters: soft)
//!   ↓
//! 3. Audit publication (fire-and-forget, soft)
//! ```
//!
//! Once step 1 committed, steps 2 and 3 are always attempted in full. A hard
//! cache failure is reported only after the audit publication for the
//! committed state was handed to the bus, so the audit trail never misses a
//! committed mutation because of a cache outage.
//!
//! ## Error Semantics
//!
//! - `NotFound`: target absent, in another project, or already removed; no
//!   writes happened
//! - `Store`: primary store failure; the transaction was rolled back
//! - `Cache`: hard cache failure after a committed write (or after a store
//!   read, when populating the cache)
//!
//! Soft failures (counters, audit) go to the injected `Observer` and never
//! change the result.
//!
//! The engine contains no IO itself; it composes the store, cache and bus
//! traits, so every combination of in-memory and real backends works.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use goods_core::{Good, GoodChanges, GoodId, NewGood, Pagination, Priority, PriorityItem, ProjectId};
use goods_events::{EventBus, MutationKind};
use goods_observability::{Observer, Stage};

use crate::audit::AuditPublisher;
use crate::cache::{CacheError, Counter, GoodsCache};
use crate::pipeline::SideEffects;
use crate::store::{GoodsStore, StoreError};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Target absent or already removed.
    #[error("good not found")]
    NotFound,

    /// Primary store failure.
    #[error(transparent)]
    Store(StoreError),

    /// Hard cache failure.
    #[error("cache failure at {stage}: {source}")]
    Cache {
        stage: Stage,
        #[source]
        source: CacheError,
    },
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => EngineError::NotFound,
            other => EngineError::Store(other),
        }
    }
}

/// Orchestrates every catalog operation.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct OrderingEngine {
    store: Arc<dyn GoodsStore>,
    cache: Arc<dyn GoodsCache>,
    effects: SideEffects,
}

impl core::fmt::Debug for OrderingEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OrderingEngine").finish_non_exhaustive()
    }
}

impl OrderingEngine {
    pub fn new(
        store: Arc<dyn GoodsStore>,
        cache: Arc<dyn GoodsCache>,
        bus: Arc<dyn EventBus>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            store,
            cache,
            effects: SideEffects::new(observer, AuditPublisher::new(bus)),
        }
    }

    /// Insert a good at the end of its project's ordering.
    #[instrument(skip(self, new_good), fields(project_id = new_good.project_id.get()), err)]
    pub async fn create(&self, new_good: NewGood) -> EngineResult<Good> {
        const OP: &str = "create";

        let good = self.store.create(new_good).await?;

        let counters = self.cache.invalidate_counters().await;
        self.effects
            .cache_step(Stage::CounterInvalidate, OP, Some(&good), counters)?;

        let cached = self.cache.set_good(&good).await;
        self.effects.audit_step(MutationKind::Created, OP, &good);
        self.effects
            .cache_step(Stage::EntityCacheWrite, OP, Some(&good), cached)?;

        debug!(good_id = good.id.get(), priority = good.priority.get(), "good created");
        Ok(good)
    }

    /// Change name and description of an active good.
    #[instrument(skip(self, changes), fields(good_id = id.get(), project_id = project_id.get()), err)]
    pub async fn update(
        &self,
        id: GoodId,
        project_id: ProjectId,
        changes: GoodChanges,
    ) -> EngineResult<Good> {
        const OP: &str = "update";

        let good = self.store.update(id, project_id, changes).await?;

        let invalidated = self.cache.invalidate_good(id, project_id).await;
        self.effects.audit_step(MutationKind::Updated, OP, &good);
        self.effects
            .cache_step(Stage::EntityCacheInvalidate, OP, Some(&good), invalidated)?;

        Ok(good)
    }

    /// Soft-delete a good. Terminal: every later operation on it is `NotFound`.
    #[instrument(skip(self), fields(good_id = id.get(), project_id = project_id.get()), err)]
    pub async fn mark_as_removed(&self, id: GoodId, project_id: ProjectId) -> EngineResult<Good> {
        const OP: &str = "mark_as_removed";

        let good = self.store.mark_removed(id, project_id).await?;

        let counters = self.cache.invalidate_counters().await;
        self.effects
            .cache_step(Stage::CounterInvalidate, OP, Some(&good), counters)?;

        let invalidated = self.cache.invalidate_good(id, project_id).await;
        self.effects.audit_step(MutationKind::Deleted, OP, &good);
        self.effects
            .cache_step(Stage::EntityCacheInvalidate, OP, Some(&good), invalidated)?;

        Ok(good)
    }

    /// Move a good to `new_priority` and return every re-ranked item,
    /// ascending by priority (the target included).
    ///
    /// Every affected entity entry is invalidated and every affected item is
    /// published, even when one of them fails. The first hard invalidation
    /// failure is returned after all items were processed.
    #[instrument(
        skip(self),
        fields(good_id = id.get(), project_id = project_id.get(), new_priority = new_priority.get()),
        err
    )]
    pub async fn reprioritize(
        &self,
        id: GoodId,
        project_id: ProjectId,
        new_priority: Priority,
    ) -> EngineResult<Vec<PriorityItem>> {
        const OP: &str = "reprioritize";

        let affected = self.store.reprioritize(id, project_id, new_priority).await?;

        let mut first_failure = None;
        for good in &affected {
            let invalidated = self.cache.invalidate_good(good.id, good.project_id).await;
            self.effects.audit_step(MutationKind::Reprioritized, OP, good);
            if let Err(err) =
                self.effects
                    .cache_step(Stage::EntityCacheInvalidate, OP, Some(good), invalidated)
            {
                first_failure.get_or_insert(err);
            }
        }

        if let Some(err) = first_failure {
            return Err(err);
        }
        Ok(affected.iter().map(PriorityItem::from).collect())
    }

    /// Cache-aside lookup of an active good.
    ///
    /// Existence is always confirmed against the store first, so a removed good
    /// is never served from a stale entry.
    #[instrument(skip(self), fields(good_id = id.get(), project_id = project_id.get()), err)]
    pub async fn get(&self, id: GoodId, project_id: ProjectId) -> EngineResult<Good> {
        const OP: &str = "get";

        if !self.store.exists(id, project_id).await? {
            return Err(EngineError::NotFound);
        }

        let cached = self.cache.get_good(id, project_id).await;
        if let Some(Some(good)) = self
            .effects
            .cache_step(Stage::EntityCacheRead, OP, None, cached)?
        {
            debug!("served from cache");
            return Ok(good);
        }

        let good = self
            .store
            .get(id, project_id)
            .await?
            .ok_or(EngineError::NotFound)?;

        let filled = self.cache.set_good(&good).await;
        self.effects
            .cache_step(Stage::EntityCacheFill, OP, Some(&good), filled)?;

        Ok(good)
    }

    /// One page of active goods, straight from the store.
    pub async fn list(&self, page: Pagination) -> EngineResult<Vec<Good>> {
        Ok(self.store.list(page).await?)
    }

    /// Active goods across all projects.
    pub async fn total_count(&self) -> EngineResult<u64> {
        self.counter(Counter::Total, "total_count").await
    }

    /// Removed goods across all projects.
    pub async fn removed_count(&self) -> EngineResult<u64> {
        self.counter(Counter::Removed, "removed_count").await
    }

    async fn counter(&self, counter: Counter, op: &'static str) -> EngineResult<u64> {
        let cached = self.cache.get_counter(counter).await;
        if let Some(Some(value)) = self
            .effects
            .cache_step(Stage::CounterRead, op, None, cached)?
        {
            return Ok(value);
        }

        let value = match counter {
            Counter::Total => self.store.total_count().await?,
            Counter::Removed => self.store.removed_count().await?,
        };

        let refreshed = self.cache.set_counter(counter, value).await;
        self.effects
            .cache_step(Stage::CounterRefresh, op, None, refreshed)?;

        Ok(value)
    }
}
