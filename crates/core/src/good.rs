//! The catalog entity and its projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{GoodId, Priority, ProjectId};

/// A catalog item ranked inside its project.
///
/// The primary store owns these rows; caches hold copies of this exact shape.
///
/// Invariants (enforced by the store, not by this type):
/// - `priority` is unique among active goods of the same project
/// - `removed` only ever moves from `false` to `true`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Good {
    pub id: GoodId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub removed: bool,
    pub created_at: DateTime<Utc>,
}

impl Good {
    pub fn is_active(&self) -> bool {
        !self.removed
    }

    pub fn priority_item(&self) -> PriorityItem {
        PriorityItem {
            id: self.id,
            priority: self.priority,
        }
    }
}

/// Input for creating a good. The store assigns id, priority and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGood {
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
}

impl NewGood {
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }
        Ok(Self {
            project_id,
            name,
            description: description.into(),
        })
    }
}

/// Mutable text fields of a good. Priority is never touched by a plain update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodChanges {
    pub name: String,
    pub description: String,
}

impl GoodChanges {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }
        Ok(Self {
            name,
            description: description.into(),
        })
    }
}

/// `(id, priority)` projection returned from reprioritization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityItem {
    pub id: GoodId,
    pub priority: Priority,
}

impl From<&Good> for PriorityItem {
    fn from(good: &Good) -> Self {
        good.priority_item()
    }
}
