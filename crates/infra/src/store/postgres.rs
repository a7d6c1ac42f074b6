//! Postgres-backed primary store.
//!
//! ## Locking
//!
//! `create` and `reprioritize` both start with
//! `pg_advisory_xact_lock(project_id)`, so every priority-affecting transaction
//! of one project runs strictly after the previous one committed or rolled
//! back. Other projects proceed in parallel. `reprioritize` additionally locks
//! the target row (`SELECT … FOR UPDATE`) before checking that it is active,
//! which closes the window between check and write against a concurrent
//! removal.
//!
//! `update` and `mark_removed` are single conditional statements
//! (`UPDATE … WHERE NOT removed RETURNING …`): an empty result is `NotFound`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database (any SQLSTATE) | `Database` |
//! | PoolClosed | `Database` |
//! | RowNotFound | `NotFound` |
//! | row decode failure | `Corrupt` |
//! | Other (I/O, TLS, timeouts) | `Database` |
//!
//! A transaction that is dropped before `commit` (early return or caller
//! cancellation) is rolled back by sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, instrument};

use goods_core::{Good, GoodChanges, GoodId, NewGood, Pagination, Priority, ProjectId};

use super::{GoodsStore, StoreError};

const GOOD_COLUMNS: &str = "id, project_id, name, description, priority, removed, created_at";

/// Postgres primary store.
///
/// Cloning is cheap; the pool is shared.
#[derive(Debug, Clone)]
pub struct PostgresGoodsStore {
    pool: PgPool,
}

impl PostgresGoodsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `goods` table and its ordering index (idempotent).
    ///
    /// There is deliberately no unique index on `(project_id, priority)`: the
    /// shift statement moves many rows by one and would trip a non-deferred
    /// unique check halfway through. Uniqueness is guaranteed by the per-project
    /// lock instead.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS goods (
                id          BIGSERIAL PRIMARY KEY,
                project_id  BIGINT      NOT NULL,
                name        TEXT        NOT NULL,
                description TEXT        NOT NULL DEFAULT '',
                priority    BIGINT      NOT NULL CHECK (priority > 0),
                removed     BOOLEAN     NOT NULL DEFAULT FALSE,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_goods_table", e))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS goods_active_rank_idx
                ON goods (project_id, priority, id)
                WHERE NOT removed
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_goods_index", e))?;

        Ok(())
    }
}

#[async_trait]
impl GoodsStore for PostgresGoodsStore {
    #[instrument(
        skip(self, new_good),
        fields(project_id = new_good.project_id.get(), good_id = tracing::field::Empty),
        err
    )]
    async fn create(&self, new_good: NewGood) -> Result<Good, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(new_good.project_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_project", e))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO goods (project_id, name, description, priority)
            VALUES ($1, $2, $3, (
                SELECT COALESCE(MAX(priority), 0) + 1
                FROM goods
                WHERE project_id = $1 AND NOT removed
            ))
            RETURNING {GOOD_COLUMNS}
            "#
        ))
        .bind(new_good.project_id.get())
        .bind(&new_good.name)
        .bind(&new_good.description)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_good", e))?;

        let good = decode_good(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("good_id", good.id.get());
        Ok(good)
    }

    async fn exists(&self, id: GoodId, project_id: ProjectId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM goods
                WHERE id = $1 AND project_id = $2 AND NOT removed
            )
            "#,
        )
        .bind(id.get())
        .bind(project_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("exists", e))
    }

    #[instrument(skip(self), fields(good_id = id.get(), project_id = project_id.get()), err)]
    async fn get(&self, id: GoodId, project_id: ProjectId) -> Result<Option<Good>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {GOOD_COLUMNS} FROM goods WHERE id = $1 AND project_id = $2 AND NOT removed"
        ))
        .bind(id.get())
        .bind(project_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_good", e))?;

        row.as_ref().map(decode_good).transpose()
    }

    #[instrument(
        skip(self, changes),
        fields(good_id = id.get(), project_id = project_id.get()),
        err
    )]
    async fn update(
        &self,
        id: GoodId,
        project_id: ProjectId,
        changes: GoodChanges,
    ) -> Result<Good, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE goods
            SET name = $1, description = $2
            WHERE id = $3 AND project_id = $4 AND NOT removed
            RETURNING {GOOD_COLUMNS}
            "#
        ))
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(id.get())
        .bind(project_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_good", e))?;

        match row {
            Some(row) => decode_good(&row),
            None => Err(StoreError::NotFound),
        }
    }

    #[instrument(skip(self), fields(good_id = id.get(), project_id = project_id.get()), err)]
    async fn mark_removed(&self, id: GoodId, project_id: ProjectId) -> Result<Good, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE goods
            SET removed = TRUE
            WHERE id = $1 AND project_id = $2 AND NOT removed
            RETURNING {GOOD_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(project_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_removed", e))?;

        match row {
            Some(row) => decode_good(&row),
            None => Err(StoreError::NotFound),
        }
    }

    #[instrument(
        skip(self),
        fields(
            good_id = id.get(),
            project_id = project_id.get(),
            new_priority = new_priority.get(),
            affected = tracing::field::Empty
        ),
        err
    )]
    async fn reprioritize(
        &self,
        id: GoodId,
        project_id: ProjectId,
        new_priority: Priority,
    ) -> Result<Vec<Good>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(project_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_project", e))?;

        let target = sqlx::query(
            "SELECT id FROM goods WHERE id = $1 AND project_id = $2 AND NOT removed FOR UPDATE",
        )
        .bind(id.get())
        .bind(project_id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_target", e))?;

        if target.is_none() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE goods
            SET priority = priority + 1
            WHERE project_id = $1
              AND priority >= $2
              AND id <> $3
              AND NOT removed
            "#,
        )
        .bind(project_id.get())
        .bind(new_priority.get())
        .bind(id.get())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("shift_priorities", e))?;

        sqlx::query("UPDATE goods SET priority = $1 WHERE id = $2 AND project_id = $3")
            .bind(new_priority.get())
            .bind(id.get())
            .bind(project_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_priority", e))?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {GOOD_COLUMNS}
            FROM goods
            WHERE project_id = $1 AND NOT removed AND priority >= $2
            ORDER BY priority ASC, id ASC
            "#
        ))
        .bind(project_id.get())
        .bind(new_priority.get())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("scan_affected", e))?;

        let affected = rows.iter().map(decode_good).collect::<Result<Vec<_>, _>>()?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("affected", affected.len());
        Ok(affected)
    }

    #[instrument(skip(self), fields(limit = page.limit, offset = page.offset), err)]
    async fn list(&self, page: Pagination) -> Result<Vec<Good>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {GOOD_COLUMNS}
            FROM goods
            WHERE NOT removed
            ORDER BY project_id ASC, priority ASC, id ASC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_goods", e))?;

        rows.iter().map(decode_good).collect()
    }

    async fn total_count(&self) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM goods WHERE NOT removed")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("total_count", e))?;
        Ok(count.max(0) as u64)
    }

    async fn removed_count(&self) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM goods WHERE removed")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("removed_count", e))?;
        Ok(count.max(0) as u64)
    }
}

/// Map SQLx errors to `StoreError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            StoreError::Database(format!(
                "database error in {operation} [{code}]: {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}

#[derive(Debug)]
struct GoodRow {
    id: i64,
    project_id: i64,
    name: String,
    description: String,
    priority: i64,
    removed: bool,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for GoodRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(GoodRow {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            priority: row.try_get("priority")?,
            removed: row.try_get("removed")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<GoodRow> for Good {
    type Error = StoreError;

    fn try_from(row: GoodRow) -> Result<Self, Self::Error> {
        let corrupt = |e: goods_core::DomainError| StoreError::Corrupt(format!("good {}: {e}", row.id));
        Ok(Good {
            id: GoodId::new(row.id).map_err(corrupt)?,
            project_id: ProjectId::new(row.project_id).map_err(corrupt)?,
            priority: Priority::new(row.priority).map_err(corrupt)?,
            name: row.name,
            description: row.description,
            removed: row.removed,
            created_at: row.created_at,
        })
    }
}

fn decode_good(row: &PgRow) -> Result<Good, StoreError> {
    let row = GoodRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to decode good row: {e}")))?;
    Good::try_from(row)
}
