//! Strongly-typed identifiers and ranks used across the domain.
//!
//! All three are positive integers. The transport boundary builds them with
//! `new` / `FromStr`, which reject zero and negative values; storage adapters
//! rebuild them from trusted rows with `from_raw`.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a good, assigned by the primary store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoodId(i64);

/// Partition key: priorities are only compared within one project.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(i64);

/// Rank of a good inside its project (1 is the first position).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(i64);

macro_rules! impl_positive_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Build a validated value (must be strictly positive).
            pub fn new(value: i64) -> Result<Self, DomainError> {
                if value <= 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must be a positive integer, got {}",
                        $name, value
                    )));
                }
                Ok(Self(value))
            }

            /// Rebuild from a value already trusted by the store.
            pub fn from_raw(value: i64) -> Self {
                Self(value)
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl TryFrom<i64> for $t {
            type Error = DomainError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Self::new(value)
            }
        }
    };
}

impl_positive_newtype!(GoodId, "GoodId");
impl_positive_newtype!(ProjectId, "ProjectId");
impl_positive_newtype!(Priority, "Priority");

impl Priority {
    /// Highest rank a caller may ask for.
    ///
    /// Appends and shifts may push stored ranks past it, but only by the
    /// number of goods in a project, which keeps them far from `i64::MAX`.
    pub const MAX_REQUESTED: i64 = i32::MAX as i64;

    /// Validate a rank requested at the boundary: positive and at most
    /// `MAX_REQUESTED`.
    pub fn requested(value: i64) -> Result<Self, DomainError> {
        let priority = Self::new(value)?;
        if value > Self::MAX_REQUESTED {
            return Err(DomainError::validation(format!(
                "Priority: must not exceed {}, got {}",
                Self::MAX_REQUESTED,
                value
            )));
        }
        Ok(priority)
    }

    /// The rank directly after this one, or `None` at `i64::MAX`.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}
