use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use goods_core::{Good, GoodId, Priority, ProjectId};

/// Write-once snapshot of a good, appended to the audit sink.
///
/// `event_time` is the capture time on the publishing side, not the commit
/// time of the primary mutation. The sink has no uniqueness requirement, so
/// redelivered duplicates are harmless.
///
/// Field names are part of the wire contract with the sink and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditEvent {
    pub id: GoodId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub removed: bool,
    pub event_time: DateTime<Utc>,
}

impl AuditEvent {
    /// Snapshot `good` as observed at `event_time`.
    pub fn capture(good: &Good, event_time: DateTime<Utc>) -> Self {
        Self {
            id: good.id,
            project_id: good.project_id,
            name: good.name.clone(),
            description: good.description.clone(),
            priority: good.priority,
            removed: good.removed,
            event_time,
        }
    }

    /// Snapshot `good` now.
    pub fn now(good: &Good) -> Self {
        Self::capture(good, Utc::now())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
