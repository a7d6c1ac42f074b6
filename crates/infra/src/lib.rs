//! Infrastructure layer: primary store, cache, bus, audit trail, and the
//! ordering engine that composes them.

pub mod audit;
pub mod cache;
pub mod config;
pub mod event_bus;
pub mod ordering_engine;
pub mod pipeline;
pub mod store;
pub mod workers;


pub use config::{ConfigError, Settings};
pub use ordering_engine::{EngineError, EngineResult, OrderingEngine};
