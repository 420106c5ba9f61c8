//! Domain services, one module per table family.
//!
//! Each service owns an `Arc<Database>` and is cheap to clone.

pub mod applications;
pub mod billing;
pub mod directory;
pub mod patients;
pub mod provisioning;
pub mod records;
