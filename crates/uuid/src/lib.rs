//! Identifier and sharded-path utilities.
//!
//! Cardio stores every table row under a sharded directory derived from a UUID, and keys
//! append-only logs (clinical records, payments) by a time-prefixed identifier so that
//! identifier order is creation order.
//!
//! This crate provides:
//! - [`ShardableUuid`]: a UUID that is guaranteed to be in canonical form once constructed.
//! - [`TimestampId`] and [`TimestampIdGenerator`]: monotonic, time-prefixed identifiers.
//! - [`Sha256Hash`]: a validated content hash used as a blob reference.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! This is the same value you would get from `Uuid::new_v4().simple().to_string()`.
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected.
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, rows are stored under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `cardio_data/patients/55/0e/550e8400e29b41d4a716446655440000/`

mod hash;
mod service;

pub use hash::Sha256Hash;
pub use service::{ShardableUuid, TimestampId, TimestampIdGenerator, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
