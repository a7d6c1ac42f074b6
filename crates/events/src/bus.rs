//! Message publishing/subscription abstraction (mechanics only).
//!
//! This module provides the **bus pattern** used by the audit pipeline: the
//! ordering engine publishes one message per mutated good, and a background
//! consumer drains every subject matching a wildcard.
//!
//! ## Design Philosophy
//!
//! - **Transport-agnostic**: works with in-memory channels or Redis pub/sub
//! - **Fire-and-forget**: `publish` hands the message over and returns; it never
//!   waits for any subscriber to process it
//! - **At-least-once acceptable**: consumers must tolerate duplicates
//! - **No ordering across subjects**: messages on different subjects may arrive
//!   in any order
//! - **No persistence**: the primary store is the source of truth, the bus only
//!   distributes
//!
//! Payloads are opaque bytes; subscribers decide how to decode them.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

/// A message as carried by the bus: subject plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    /// The bus (or its background forwarder) has shut down.
    #[error("bus closed")]
    Closed,

    /// Connection-level failure in the underlying transport.
    #[error("bus connection error: {0}")]
    Connection(String),

    /// Publish/subscribe lock poisoned.
    #[error("bus lock poisoned")]
    Poisoned,
}

/// A subscription to every subject matching a pattern.
///
/// ## Usage Pattern
///
/// ```ignore
/// let mut subscription = bus.subscribe("good.*")?;
/// while let Some(message) = subscription.recv().await {
///     handle(message);
/// }
/// // `None`: the bus side was dropped.
/// ```
///
/// Subscriptions are meant for a single consuming task.
#[derive(Debug)]
pub struct Subscription {
    pattern: String,
    receiver: UnboundedReceiver<BusMessage>,
}

impl Subscription {
    pub fn new(pattern: impl Into<String>, receiver: UnboundedReceiver<BusMessage>) -> Self {
        Self {
            pattern: pattern.into(),
            receiver,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Wait for the next message; `None` once the bus side is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<BusMessage, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Domain-agnostic pub/sub bus.
///
/// ## Delivery Guarantees
///
/// - messages may be delivered more than once
/// - messages on different subjects may be delivered out of order
/// - a failed `publish` is reported to the caller, who decides whether it is
///   fatal (the ordering engine never treats it as fatal)
///
/// ## Thread Safety
///
/// Implementations are `Send + Sync` and shared process-wide; many request
/// tasks publish concurrently.
pub trait EventBus: Send + Sync {
    /// Hand `message` to the transport without waiting for delivery.
    fn publish(&self, message: BusMessage) -> Result<(), BusError>;

    /// Receive every message whose subject matches `pattern`.
    fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError>;
}

impl<B> EventBus for Arc<B>
where
    B: EventBus + ?Sized,
{
    fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        (**self).publish(message)
    }

    fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        (**self).subscribe(pattern)
    }
}
