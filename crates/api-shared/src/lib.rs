//! # API Shared
//!
//! Shared definitions for the Cardio APIs.
//!
//! Contains:
//! - Request/response types with OpenAPI schemas, converted from the core domain types
//! - Shared services like `HealthService`
//! - Admin API-key validation
//!
//! Used by `api-rest`; the core crate never sees these types.

pub mod applications;
pub mod auth;
pub mod billing;
pub mod directory;
pub mod error;
pub mod health;
pub mod patients;
pub mod records;

pub use applications::*;
pub use billing::*;
pub use directory::*;
pub use error::ErrorRes;
pub use health::{HealthRes, HealthService};
pub use patients::*;
pub use records::*;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";
