//! Cache layer: cache-aside entries for single goods plus two aggregate
//! counters.
//!
//! The cache never originates a value. Everything in it is a derived copy of a
//! primary store read, bounded by a TTL, and may vanish at any moment. A
//! missing entry is reported as `Ok(None)`; `Err` is reserved for the cache
//! itself being unreachable or holding undecodable data.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use goods_core::{Good, GoodId, ProjectId};

pub use in_memory::InMemoryGoodsCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisGoodsCache;

/// Default lifetime of every cache entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

pub const TOTAL_COUNT_KEY: &str = "goods:total_count";
pub const REMOVED_COUNT_KEY: &str = "goods:removed_count";

/// Entry key of a single good: `good:{projectId}:{id}`.
pub fn good_key(project_id: ProjectId, id: GoodId) -> String {
    format!("good:{project_id}:{id}")
}

/// Aggregate counters kept next to the entity entries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Active goods across all projects.
    Total,
    /// Removed goods across all projects.
    Removed,
}

impl Counter {
    pub fn key(self) -> &'static str {
        match self {
            Counter::Total => TOTAL_COUNT_KEY,
            Counter::Removed => REMOVED_COUNT_KEY,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode cache entry: {0}")]
    Encode(String),

    #[error("failed to decode cache entry {key}: {reason}")]
    Decode { key: String, reason: String },
}

#[async_trait]
pub trait GoodsCache: Send + Sync {
    async fn get_good(&self, id: GoodId, project_id: ProjectId) -> Result<Option<Good>, CacheError>;

    async fn set_good(&self, good: &Good) -> Result<(), CacheError>;

    async fn invalidate_good(&self, id: GoodId, project_id: ProjectId) -> Result<(), CacheError>;

    async fn get_counter(&self, counter: Counter) -> Result<Option<u64>, CacheError>;

    async fn set_counter(&self, counter: Counter, value: u64) -> Result<(), CacheError>;

    /// Drop both aggregate counters.
    async fn invalidate_counters(&self) -> Result<(), CacheError>;
}

fn encode_good(good: &Good) -> Result<String, CacheError> {
    serde_json::to_string(good).map_err(|e| CacheError::Encode(e.to_string()))
}

fn decode_good(key: &str, raw: &str) -> Result<Good, CacheError> {
    serde_json::from_str(raw).map_err(|e| CacheError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode_counter(key: &str, raw: &str) -> Result<u64, CacheError> {
    raw.trim().parse().map_err(|e: std::num::ParseIntError| CacheError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
