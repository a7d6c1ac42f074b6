//! Audit events and the message bus that carries them.
//!
//! - `audit`: the `AuditEvent` wire shape mirrored into the analytical sink
//! - `subject`: mutation kinds and subject/wildcard matching
//! - `bus`: transport-agnostic publish/subscribe abstraction
//! - `in_memory_bus`: bus implementation for tests/dev

pub mod audit;
pub mod bus;
pub mod in_memory_bus;
pub mod subject;

pub use audit::AuditEvent;
pub use bus::{BusError, BusMessage, EventBus, Subscription};
pub use in_memory_bus::InMemoryEventBus;
pub use subject::{MutationKind, SUBJECT_WILDCARD, subject_matches};
