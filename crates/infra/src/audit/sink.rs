//! Append-only analytical sink for audit events.
//!
//! The sink has no uniqueness requirement: redelivered or reordered events are
//! simply stored again. Nothing in the write path ever reads it back.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use goods_events::AuditEvent;

use super::AuditError;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// `goods_log` table in Postgres.
#[derive(Debug, Clone)]
pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `goods_log` table (idempotent). It has no primary key.
    pub async fn ensure_schema(&self) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS goods_log (
                id          BIGINT      NOT NULL,
                project_id  BIGINT      NOT NULL,
                name        TEXT        NOT NULL,
                description TEXT        NOT NULL,
                priority    BIGINT      NOT NULL,
                removed     BOOLEAN     NOT NULL,
                event_time  TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Sink(format!("create goods_log: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    #[instrument(skip(self, event), fields(good_id = event.id.get(), project_id = event.project_id.get()), err)]
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO goods_log (id, project_id, name, description, priority, removed, event_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id.get())
        .bind(event.project_id.get())
        .bind(&event.name)
        .bind(&event.description)
        .bind(event.priority.get())
        .bind(event.removed)
        .bind(event.event_time)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Sink(format!("insert goods_log: {e}")))?;
        Ok(())
    }
}

/// In-memory sink for tests/dev, with optional artificial latency and failure.
///
/// Unbounded by default; `bounded` keeps only the most recent events.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    retain: Option<usize>,
    delay: Mutex<Option<Duration>>,
    failing: AtomicBool,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retain` events, dropping the oldest first.
    pub fn bounded(retain: usize) -> Self {
        Self {
            retain: Some(retain),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sleep this long before every append.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.delay.lock() {
            *d = delay;
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Sink("injected sink failure".to_string()));
        }
        let mut events = self
            .events
            .lock()
            .map_err(|_| AuditError::Sink("lock poisoned".to_string()))?;
        events.push_back(event.clone());
        if let Some(retain) = self.retain {
            while events.len() > retain {
                events.pop_front();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use goods_core::{Good, GoodId, Priority, ProjectId};

    fn event(id: i64) -> AuditEvent {
        AuditEvent::now(&Good {
            id: GoodId::from_raw(id),
            project_id: ProjectId::from_raw(1),
            name: format!("good-{id}"),
            description: String::new(),
            priority: Priority::from_raw(1),
            removed: false,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn bounded_sink_keeps_the_most_recent_events() {
        let sink = InMemoryAuditSink::bounded(2);
        for id in 1..=3 {
            sink.append(&event(id)).await.unwrap();
        }
        let ids: Vec<_> = sink.events().iter().map(|e| e.id.get()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn default_sink_keeps_duplicates() {
        let sink = InMemoryAuditSink::new();
        let e = event(7);
        sink.append(&e).await.unwrap();
        sink.append(&e).await.unwrap();
        assert_eq!(sink.events(), vec![e.clone(), e]);
    }
}
