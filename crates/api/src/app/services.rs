use std::sync::Arc;

use thiserror::Error;

use goods_events::{BusError, EventBus, InMemoryEventBus};
use goods_infra::audit::{AuditError, AuditSink, InMemoryAuditSink};
use goods_infra::cache::{CacheError, GoodsCache, InMemoryGoodsCache};
use goods_infra::store::{GoodsStore, InMemoryGoodsStore, StoreError};
use goods_infra::workers::{AuditWorker, WorkerHandle};
use goods_infra::{OrderingEngine, Settings};
use goods_observability::{Observer, TracingObserver};

#[cfg(feature = "redis")]
use goods_infra::{
    audit::PostgresAuditSink, cache::RedisGoodsCache, event_bus::RedisPubSubEventBus,
    store::PostgresGoodsStore,
};

/// Failures while wiring infrastructure at startup.
#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("primary store: {0}")]
    Store(#[from] StoreError),

    #[error("cache: {0}")]
    Cache(#[from] CacheError),

    #[error("event bus: {0}")]
    Bus(#[from] BusError),

    #[error("audit sink: {0}")]
    Audit(#[from] AuditError),
}

/// Everything a request handler or the process bootstrap needs.
#[derive(Clone)]
pub struct AppServices {
    pub engine: OrderingEngine,
    pub bus: Arc<dyn EventBus>,
    pub audit_sink: Arc<dyn AuditSink>,
    pub observer: Arc<dyn Observer>,
    pub settings: Settings,
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("engine", &self.engine)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AppServices {
    fn assemble(
        store: Arc<dyn GoodsStore>,
        cache: Arc<dyn GoodsCache>,
        bus: Arc<dyn EventBus>,
        audit_sink: Arc<dyn AuditSink>,
        observer: Arc<dyn Observer>,
        settings: &Settings,
    ) -> Self {
        Self {
            engine: OrderingEngine::new(store, cache, bus.clone(), observer.clone()),
            bus,
            audit_sink,
            observer,
            settings: settings.clone(),
        }
    }

    /// Subscribe to the audit subjects and start draining them into the sink.
    pub fn spawn_audit_worker(&self) -> Result<WorkerHandle, BusError> {
        let subscription = self.bus.subscribe(&self.settings.audit_subject_pattern)?;
        let worker = AuditWorker::new(
            self.audit_sink.clone(),
            self.observer.clone(),
            self.settings.audit_timeout,
        );
        Ok(worker.spawn("audit", subscription))
    }
}

pub async fn build_services(settings: &Settings) -> Result<AppServices, ServicesError> {
    if settings.use_persistent_stores {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(settings).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
        }
    }

    Ok(build_in_memory_services(settings))
}

/// Audit events kept by the in-memory wiring before the oldest are dropped.
pub const IN_MEMORY_AUDIT_RETENTION: usize = 10_000;

/// In-memory wiring (dev/test): nothing leaves the process and nothing
/// survives a restart. The audit trail keeps only the most recent
/// `IN_MEMORY_AUDIT_RETENTION` events.
pub fn build_in_memory_services(settings: &Settings) -> AppServices {
    tracing::info!("wiring in-memory store, cache and bus");
    AppServices::assemble(
        Arc::new(InMemoryGoodsStore::new()),
        Arc::new(InMemoryGoodsCache::with_ttl(settings.cache_ttl)),
        Arc::new(InMemoryEventBus::new()),
        Arc::new(InMemoryAuditSink::bounded(IN_MEMORY_AUDIT_RETENTION)),
        Arc::new(TracingObserver),
        settings,
    )
}

#[cfg(feature = "redis")]
async fn build_persistent_services(settings: &Settings) -> Result<AppServices, ServicesError> {
    let database_url = settings
        .database_url
        .as_deref()
        .ok_or_else(|| StoreError::Database("DATABASE_URL is not configured".to_string()))?;

    let store = PostgresGoodsStore::connect(database_url, settings.database_max_connections).await?;
    store.ensure_schema().await?;

    let audit_sink = PostgresAuditSink::new(store.pool().clone());
    audit_sink.ensure_schema().await?;

    let cache = RedisGoodsCache::connect(&settings.redis_url, Some(settings.cache_ttl)).await?;
    let observer: Arc<dyn Observer> = Arc::new(TracingObserver);
    let bus = RedisPubSubEventBus::connect(&settings.redis_url, observer.clone()).await?;

    tracing::info!(redis_url = %settings.redis_url, "wiring postgres store, redis cache and redis bus");

    Ok(AppServices::assemble(
        Arc::new(store),
        Arc::new(cache),
        Arc::new(bus),
        Arc::new(audit_sink),
        observer,
        settings,
    ))
}
