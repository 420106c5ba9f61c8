//! Constants used throughout the Cardio core crate.

use std::time::Duration;

/// Default directory for persisted tables when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "cardio_data";

/// Filename of a persisted row inside its sharded directory.
pub const ROW_FILENAME: &str = "row.json";

/// Version stamped on every persisted row.
pub const SCHEMA_VERSION: u32 = 1;

pub const APPLICATIONS_TABLE: &str = "applications";
pub const HOSPITALS_TABLE: &str = "hospitals";
pub const DOCTORS_TABLE: &str = "doctors";
pub const USERS_TABLE: &str = "users";
pub const PATIENTS_TABLE: &str = "patients";
pub const RECORDS_TABLE: &str = "records";
pub const PAYMENTS_TABLE: &str = "payments";
pub const PAYMENT_ATTEMPTS_TABLE: &str = "payment_attempts";

/// Maximum number of records returned for one patient's history.
pub const RECORD_PAGE_SIZE: usize = 100;

/// Days a successful payment keeps a subscription active.
pub const SUBSCRIPTION_WINDOW_DAYS: i64 = 30;

/// Probability that a non-first simulated payment attempt succeeds.
pub const PAYMENT_SUCCESS_RATE: f64 = 0.95;

/// Upper bound on any single identity provider call.
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);
