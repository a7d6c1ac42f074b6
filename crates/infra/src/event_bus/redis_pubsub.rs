//! Redis pub/sub-backed event bus.
//!
//! Note: Redis pub/sub is not durable (messages are dropped while no subscriber
//! is connected). The audit trail tolerates that; the primary store stays the
//! source of truth.
//!
//! `publish` never touches the network on the caller's task. Messages go into
//! an unbounded channel drained by one forwarder task that issues `PUBLISH`.
//! `subscribe` spawns a task per subscription that issues `PSUBSCRIBE` and
//! forwards matching messages into the returned `Subscription`. A dropped
//! connection is reported to the observer and re-established with backoff for
//! as long as the `Subscription` is alive.

use std::sync::Arc;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use goods_events::{BusError, BusMessage, EventBus, Subscription, subject_matches};
use goods_observability::{Observer, SoftFailure, Stage};

/// Redis pub/sub bus for audit messages.
#[derive(Clone)]
pub struct RedisPubSubEventBus {
    client: ::redis::Client,
    outbound: UnboundedSender<BusMessage>,
    observer: Arc<dyn Observer>,
}

impl core::fmt::Debug for RedisPubSubEventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisPubSubEventBus")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl RedisPubSubEventBus {
    /// Connect and start the publish forwarder. Must run inside a tokio runtime.
    pub async fn connect(
        redis_url: impl AsRef<str>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, BusError> {
        let client = ::redis::Client::open(redis_url.as_ref()).map_err(connection)?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(connection)?;

        let (outbound, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_publishes(conn, rx));

        Ok(Self {
            client,
            outbound,
            observer,
        })
    }
}

fn connection(err: ::redis::RedisError) -> BusError {
    BusError::Connection(err.to_string())
}

async fn forward_publishes(mut conn: ConnectionManager, mut rx: UnboundedReceiver<BusMessage>) {
    while let Some(message) = rx.recv().await {
        let published: Result<i64, _> = ::redis::cmd("PUBLISH")
            .arg(&message.subject)
            .arg(message.payload.as_slice())
            .query_async(&mut conn)
            .await;

        match published {
            Ok(receivers) => debug!(subject = %message.subject, receivers, "published"),
            Err(err) => warn!(subject = %message.subject, error = %err, "redis publish failed"),
        }
    }
    debug!("redis publish forwarder stopped");
}

impl EventBus for RedisPubSubEventBus {
    fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        self.outbound.send(message).map_err(|_| BusError::Closed)
    }

    fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| BusError::Connection("redis subscriptions need a tokio runtime".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(pump_subscription(
            self.client.clone(),
            pattern.to_string(),
            tx,
            self.observer.clone(),
        ));

        Ok(Subscription::new(pattern, rx))
    }
}

enum Drained {
    /// The `Subscription` was dropped; stop for good.
    ReceiverGone,
    /// Connection failed or the message stream ended.
    Disconnected { subscribed: bool, reason: String },
}

/// Keep one pattern subscription alive until its receiver is dropped,
/// reconnecting with capped exponential backoff.
async fn pump_subscription(
    client: ::redis::Client,
    pattern: String,
    tx: UnboundedSender<BusMessage>,
    observer: Arc<dyn Observer>,
) {
    let mut attempt: u32 = 0;
    loop {
        match drain_once(&client, &pattern, &tx).await {
            Drained::ReceiverGone => break,
            Drained::Disconnected { subscribed, reason } => {
                if subscribed {
                    attempt = 0;
                }
                let delay = reconnect_delay(attempt);
                attempt = attempt.saturating_add(1);

                observer.soft_failure(SoftFailure::new(
                    Stage::AuditSubscribe,
                    "audit_subscribe",
                    format!("{reason}; reconnecting to {pattern} in {delay:?}"),
                ));

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = tx.closed() => break,
                }
            }
        }
    }
    debug!(pattern = %pattern, "redis subscription stopped");
}

async fn drain_once(
    client: &::redis::Client,
    pattern: &str,
    tx: &UnboundedSender<BusMessage>,
) -> Drained {
    let mut pubsub = match client.get_async_pubsub().await {
        Ok(p) => p,
        Err(err) => {
            return Drained::Disconnected {
                subscribed: false,
                reason: format!("redis subscribe connection failed: {err}"),
            };
        }
    };
    if let Err(err) = pubsub.psubscribe(pattern).await {
        return Drained::Disconnected {
            subscribed: false,
            reason: format!("redis psubscribe failed: {err}"),
        };
    }
    info!(pattern = %pattern, "subscribed to redis pattern");

    let mut stream = Box::pin(pubsub.into_on_message());
    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(msg) => {
                    let subject = msg.get_channel_name().to_string();
                    // Redis globs are looser than dot-token patterns (`*` spans dots).
                    if !subject_matches(pattern, &subject) {
                        continue;
                    }
                    let payload = msg.get_payload_bytes().to_vec();
                    if tx.send(BusMessage::new(subject, payload)).is_err() {
                        return Drained::ReceiverGone;
                    }
                }
                None => {
                    return Drained::Disconnected {
                        subscribed: true,
                        reason: "redis message stream ended".to_string(),
                    };
                }
            },
            _ = tx.closed() => return Drained::ReceiverGone,
        }
    }
}

const RECONNECT_BASE: Duration = Duration::from_millis(100);
const RECONNECT_MAX: Duration = Duration::from_secs(10);

fn reconnect_delay(attempt: u32) -> Duration {
    RECONNECT_BASE
        .saturating_mul(2u32.saturating_pow(attempt.min(16)))
        .min(RECONNECT_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use goods_observability::RecordingObserver;

    #[test]
    fn reconnect_delay_doubles_up_to_the_cap() {
        assert_eq!(reconnect_delay(0), Duration::from_millis(100));
        assert_eq!(reconnect_delay(1), Duration::from_millis(200));
        assert_eq!(reconnect_delay(3), Duration::from_millis(800));
        assert_eq!(reconnect_delay(7), RECONNECT_MAX);
        assert_eq!(reconnect_delay(u32::MAX), RECONNECT_MAX);
    }

    #[tokio::test]
    async fn unreachable_server_is_reported_and_retried_until_dropped() {
        // Nothing listens on port 1; every connect attempt fails fast.
        let client = ::redis::Client::open("redis://127.0.0.1:1").unwrap();
        let observer = Arc::new(RecordingObserver::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_subscription(
            client,
            "good.*".to_string(),
            tx,
            observer.clone(),
        ));

        for _ in 0..200 {
            if observer.count(Stage::AuditSubscribe) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(observer.count(Stage::AuditSubscribe) >= 2);
        assert!(!pump.is_finished());

        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), pump)
            .await
            .unwrap()
            .unwrap();
    }
}
