use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use goods_events::{AuditEvent, BusMessage, Subscription};
use goods_observability::{Observer, SoftFailure, Stage};

use crate::audit::AuditSink;

const OPERATION: &str = "audit_consume";

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// A message that is being appended when shutdown is requested is finished
    /// first (bounded by the per-message timeout).
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

/// Drains audit messages from a bus subscription into a sink.
///
/// - Every message is decoded on its own; a malformed payload is reported and
///   skipped
/// - Every append runs under `append_timeout`; a slow sink never stalls the
///   worker for longer than that per message
/// - Delivery may be duplicated or reordered; the sink accepts both
#[derive(Clone)]
pub struct AuditWorker {
    sink: Arc<dyn AuditSink>,
    observer: Arc<dyn Observer>,
    append_timeout: Duration,
}

impl AuditWorker {
    pub fn new(
        sink: Arc<dyn AuditSink>,
        observer: Arc<dyn Observer>,
        append_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            observer,
            append_timeout,
        }
    }

    /// Spawn the consume loop on the current tokio runtime.
    pub fn spawn(self, name: &'static str, subscription: Subscription) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(name, subscription, shutdown_rx));
        WorkerHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }

    async fn run(
        self,
        name: &'static str,
        mut subscription: Subscription,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        info!(worker = name, pattern = subscription.pattern(), "audit worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                next = subscription.recv() => match next {
                    Some(message) => {
                        self.handle(message).await;
                    }
                    None => break,
                },
            }
        }
        info!(worker = name, "audit worker stopped");
    }

    /// Decode one message and append it to the sink.
    ///
    /// Returns true when the event reached the sink.
    pub async fn handle(&self, message: BusMessage) -> bool {
        debug!(subject = %message.subject, "audit message received");

        let event = match AuditEvent::from_bytes(&message.payload) {
            Ok(event) => event,
            Err(err) => {
                self.observer
                    .soft_failure(SoftFailure::new(Stage::AuditDecode, OPERATION, err));
                return false;
            }
        };

        match tokio::time::timeout(self.append_timeout, self.sink.append(&event)).await {
            Ok(Ok(())) => {
                debug!(
                    good_id = event.id.get(),
                    project_id = event.project_id.get(),
                    subject = %message.subject,
                    "audit event logged"
                );
                true
            }
            Ok(Err(err)) => {
                self.observer.soft_failure(
                    SoftFailure::new(Stage::AuditAppend, OPERATION, err)
                        .with_good(event.id, event.project_id),
                );
                false
            }
            Err(_) => {
                self.observer.soft_failure(
                    SoftFailure::new(
                        Stage::AuditTimeout,
                        OPERATION,
                        format!("append exceeded {:?}", self.append_timeout),
                    )
                    .with_good(event.id, event.project_id),
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use goods_core::{Good, GoodId, Priority, ProjectId};
    use goods_events::{EventBus, InMemoryEventBus, MutationKind, SUBJECT_WILDCARD};
    use goods_observability::RecordingObserver;

    use crate::audit::InMemoryAuditSink;

    fn event(id: i64) -> AuditEvent {
        AuditEvent::now(&Good {
            id: GoodId::from_raw(id),
            project_id: ProjectId::from_raw(1),
            name: format!("good-{id}"),
            description: String::new(),
            priority: Priority::from_raw(id),
            removed: false,
            created_at: Utc::now(),
        })
    }

    fn message(kind: MutationKind, event: &AuditEvent) -> BusMessage {
        BusMessage::new(kind.subject(), event.to_bytes().unwrap())
    }

    fn worker(timeout: Duration) -> (AuditWorker, Arc<InMemoryAuditSink>, Arc<RecordingObserver>) {
        let sink = Arc::new(InMemoryAuditSink::new());
        let observer = Arc::new(RecordingObserver::new());
        (
            AuditWorker::new(sink.clone(), observer.clone(), timeout),
            sink,
            observer,
        )
    }

    #[tokio::test]
    async fn appends_decoded_events() {
        let (worker, sink, observer) = worker(Duration::from_secs(1));
        let sent = event(1);
        assert!(worker.handle(message(MutationKind::Created, &sent)).await);
        assert_eq!(sink.events(), vec![sent]);
        assert!(observer.is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_reported_and_dropped() {
        let (worker, sink, observer) = worker(Duration::from_secs(1));
        let handled = worker
            .handle(BusMessage::new("good.created", b"not json".to_vec()))
            .await;
        assert!(!handled);
        assert!(sink.is_empty());
        assert_eq!(observer.count(Stage::AuditDecode), 1);
    }

    #[tokio::test]
    async fn sink_failure_is_soft() {
        let (worker, sink, observer) = worker(Duration::from_secs(1));
        sink.set_failing(true);
        assert!(!worker.handle(message(MutationKind::Deleted, &event(2))).await);
        assert_eq!(observer.count(Stage::AuditAppend), 1);
        assert_eq!(observer.failures()[0].good_id, Some(GoodId::from_raw(2)));
    }

    #[tokio::test]
    async fn slow_sink_hits_the_per_message_timeout() {
        let (worker, sink, observer) = worker(Duration::from_millis(20));
        sink.set_delay(Some(Duration::from_millis(500)));
        assert!(!worker.handle(message(MutationKind::Updated, &event(3))).await);
        assert_eq!(observer.count(Stage::AuditTimeout), 1);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn spawned_worker_drains_subscription_and_stops() {
        let bus = InMemoryEventBus::new();
        let (worker, sink, _observer) = worker(Duration::from_secs(1));
        let handle = worker.spawn("audit-test", bus.subscribe(SUBJECT_WILDCARD).unwrap());

        for id in 1..=3 {
            bus.publish(message(MutationKind::Reprioritized, &event(id))).unwrap();
        }
        bus.publish(BusMessage::new("order.created", b"{}".to_vec())).unwrap();

        for _ in 0..100 {
            if sink.len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let ids: Vec<_> = sink.events().iter().map(|e| e.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn redelivered_and_interleaved_messages_are_kept_in_arrival_order() {
        let bus = InMemoryEventBus::new();
        let (worker, sink, observer) = worker(Duration::from_secs(1));
        let handle = worker.spawn("audit-test", bus.subscribe(SUBJECT_WILDCARD).unwrap());

        let created = event(1);
        let mut updated = event(1);
        updated.name = "renamed".to_string();
        let other = event(2);

        // The update overtakes the creation, and the update arrives twice.
        let arrivals = [
            message(MutationKind::Updated, &updated),
            message(MutationKind::Reprioritized, &other),
            message(MutationKind::Created, &created),
            message(MutationKind::Updated, &updated),
        ];
        for msg in arrivals {
            bus.publish(msg).unwrap();
        }

        for _ in 0..100 {
            if sink.len() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            sink.events(),
            vec![updated.clone(), other, created, updated]
        );
        assert!(observer.is_empty());

        handle.shutdown().await;
    }
}
