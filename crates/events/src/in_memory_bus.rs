//! In-memory event bus for tests/dev.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::{self, UnboundedSender};

use crate::bus::{BusError, BusMessage, EventBus, Subscription};
use crate::subject::subject_matches;

/// In-memory pub/sub bus.
///
/// - No IO
/// - Fan-out to every subscriber whose pattern matches the subject
/// - Dead subscribers are dropped while publishing
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    subscribers: Mutex<Vec<(String, UnboundedSender<BusMessage>)>>,
    reject_publishes: AtomicBool,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `publish` fail with `BusError::Closed`.
    pub fn set_reject_publishes(&self, reject: bool) {
        self.reject_publishes.store(reject, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        if self.reject_publishes.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let mut subs = self.subscribers.lock().map_err(|_| BusError::Poisoned)?;

        subs.retain(|(pattern, tx)| {
            if !subject_matches(pattern, &message.subject) {
                return !tx.is_closed();
            }
            tx.send(message.clone()).is_ok()
        });

        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .map_err(|_| BusError::Poisoned)?
            .push((pattern.to_string(), tx));
        Ok(Subscription::new(pattern, rx))
    }
}
