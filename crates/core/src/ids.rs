//! Typed row identifiers.
//!
//! Entity tables key rows by a [`ShardableUuid`]; append-only logs (records, payments,
//! payment attempts) key rows by a [`TimestampId`] so identifiers sort by creation time.

use cardio_uuid::{ShardableUuid, TimestampId, UuidError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ShardableUuid);

        impl $name {
            pub fn new() -> Self {
                Self(ShardableUuid::new())
            }

            pub fn shard(&self) -> ShardableUuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = UuidError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ShardableUuid::parse(s).map(Self)
            }
        }
    };
}

macro_rules! log_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(TimestampId);

        impl $name {
            pub(crate) fn from_timestamp_id(id: TimestampId) -> Self {
                Self(id)
            }

            pub fn timestamp_id(&self) -> TimestampId {
                self.0
            }

            pub fn shard(&self) -> ShardableUuid {
                *self.0.uuid()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = UuidError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

entity_id!(ApplicationId);
entity_id!(HospitalId);
entity_id!(DoctorId);
entity_id!(UserId);
entity_id!(PatientId);

log_id!(
    /// Identifier of a clinical record; sorts by creation time.
    RecordId
);
log_id!(PaymentId);
log_id!(PaymentAttemptId);
