//! Page window for listing active goods.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Pagination parameters for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of goods to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Clamp raw request values into a valid window.
    ///
    /// Missing or non-positive limits fall back to the default, limits above
    /// the cap are clamped to it, negative offsets become 0.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > 0 => l.min(MAX_LIMIT as i64) as u32,
            _ => DEFAULT_LIMIT,
        };
        let offset = offset.unwrap_or(0).clamp(0, u32::MAX as i64) as u32;
        Self { limit, offset }
    }
}
