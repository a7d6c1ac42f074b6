use std::sync::Arc;

use goods_core::Good;
use goods_events::{AuditEvent, BusMessage, EventBus, MutationKind};

use super::AuditError;

/// Turns post-mutation snapshots into bus messages.
///
/// Publishing is a handoff: the bus accepts or rejects the message
/// immediately and never waits for the audit consumer.
#[derive(Clone)]
pub struct AuditPublisher {
    bus: Arc<dyn EventBus>,
}

impl core::fmt::Debug for AuditPublisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditPublisher").finish_non_exhaustive()
    }
}

impl AuditPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Snapshot `good` now and publish it on the subject of `kind`.
    pub fn publish(&self, kind: MutationKind, good: &Good) -> Result<AuditEvent, AuditError> {
        let event = AuditEvent::now(good);
        let payload = event.to_bytes()?;
        self.bus.publish(BusMessage::new(kind.subject(), payload))?;
        Ok(event)
    }
}
