//! Primary store boundary.
//!
//! The primary store is the single source of truth for goods: identity,
//! ordering and soft-delete status. Every mutation runs as one transaction,
//! so a failed or cancelled call leaves no partial writes behind.
//!
//! ## Ordering invariant
//!
//! After any completed mutation, active goods of one project carry pairwise
//! distinct priorities. Implementations serialize priority-affecting writes per
//! project (`create`, `reprioritize`); the Postgres store uses a transaction
//! scoped advisory lock, the in-memory store a single mutex.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use goods_core::{Good, GoodChanges, GoodId, NewGood, Pagination, Priority, ProjectId};

pub use in_memory::InMemoryGoodsStore;
pub use postgres::PostgresGoodsStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Target is absent, belongs to another project, or is already removed.
    #[error("good not found")]
    NotFound,

    /// I/O, connection or transaction failure.
    #[error("store failure: {0}")]
    Database(String),

    /// Appending or shifting would push a rank past `i64::MAX`.
    #[error("priority overflow in project {0}")]
    PriorityOverflow(i64),

    /// A row could not be decoded into a `Good`.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait GoodsStore: Send + Sync {
    /// Insert a new active good ranked after every active good of its project.
    async fn create(&self, new_good: NewGood) -> Result<Good, StoreError>;

    /// True when the good exists in the project and is not removed.
    async fn exists(&self, id: GoodId, project_id: ProjectId) -> Result<bool, StoreError>;

    /// Load an active good; `None` when absent or removed.
    async fn get(&self, id: GoodId, project_id: ProjectId) -> Result<Option<Good>, StoreError>;

    /// Change name/description of an active good. Priority is untouched.
    async fn update(
        &self,
        id: GoodId,
        project_id: ProjectId,
        changes: GoodChanges,
    ) -> Result<Good, StoreError>;

    /// Flip `removed` to true and return the post-removal snapshot.
    ///
    /// Fails with `NotFound` when the good is absent or already removed.
    async fn mark_removed(&self, id: GoodId, project_id: ProjectId) -> Result<Good, StoreError>;

    /// Move the target to `new_priority`, shifting every other active good of
    /// the project at or above it up by one.
    ///
    /// Returns the active goods of the project whose priority is now
    /// `>= new_priority`, ordered by `(priority, id)`. The target is always
    /// part of that list.
    async fn reprioritize(
        &self,
        id: GoodId,
        project_id: ProjectId,
        new_priority: Priority,
    ) -> Result<Vec<Good>, StoreError>;

    /// Page through active goods ordered by `(project_id, priority, id)`.
    async fn list(&self, page: Pagination) -> Result<Vec<Good>, StoreError>;

    /// Number of active goods across all projects.
    async fn total_count(&self) -> Result<u64, StoreError>;

    /// Number of removed goods across all projects.
    async fn removed_count(&self) -> Result<u64, StoreError>;
}
