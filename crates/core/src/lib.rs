//! `goods-core`: catalog domain building blocks.
//!
//! This crate contains **pure domain** types (no infrastructure concerns): the
//! `Good` entity, its identifiers, the priority projection returned from
//! reordering, and pagination rules.

pub mod error;
pub mod good;
pub mod id;
pub mod pagination;

pub use error::{DomainError, DomainResult};
pub use good::{Good, GoodChanges, NewGood, PriorityItem};
pub use id::{GoodId, Priority, ProjectId};
pub use pagination::Pagination;
