//! Hospitals, doctors and users created by approved applications.

use crate::constants::{DOCTORS_TABLE, HOSPITALS_TABLE, USERS_TABLE};
use crate::identity::{ExternalUserId, OrganizationId};
use crate::ids::{ApplicationId, DoctorId, HospitalId, UserId};
use crate::repositories::applications::{HospitalDetails, NominatedDoctor};
use crate::store::{Database, Row};
use crate::{CardioError, CardioResult};
use cardio_types::{EmailAddress, NonEmptyText, PhoneNumber};
use cardio_uuid::ShardableUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub(crate) const BY_ORG: &str = "org_id";
pub(crate) const BY_APPLICATION: &str = "application_id";
pub(crate) const BY_EXTERNAL_USER: &str = "external_user_id";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hospital {
    pub schema_version: u32,
    pub id: HospitalId,
    #[serde(flatten)]
    pub details: HospitalDetails,
    pub doctor: NominatedDoctor,
    pub application_id: ApplicationId,
    pub org_id: OrganizationId,
    pub created_at: DateTime<Utc>,
}

impl Row for Hospital {
    const TABLE: &'static str = HOSPITALS_TABLE;
    type Key = HospitalId;

    fn key(&self) -> HospitalId {
        self.id
    }

    fn shard(&self) -> ShardableUuid {
        self.id.shard()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn index_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (BY_ORG, self.org_id.to_string()),
            (BY_APPLICATION, self.application_id.to_string()),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub schema_version: u32,
    pub id: DoctorId,
    pub name: NonEmptyText,
    pub email: EmailAddress,
    pub phone: PhoneNumber,
    pub specialization: NonEmptyText,
    pub license_number: NonEmptyText,
    pub org_id: OrganizationId,
    pub external_user_id: ExternalUserId,
    pub created_at: DateTime<Utc>,
}

impl Row for Doctor {
    const TABLE: &'static str = DOCTORS_TABLE;
    type Key = DoctorId;

    fn key(&self) -> DoctorId {
        self.id
    }

    fn shard(&self) -> ShardableUuid {
        self.id.shard()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn index_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (BY_ORG, self.org_id.to_string()),
            (BY_EXTERNAL_USER, self.external_user_id.to_string()),
        ]
    }
}

/// Links an identity provider account to its organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub schema_version: u32,
    pub id: UserId,
    pub org_id: OrganizationId,
    pub external_user_id: ExternalUserId,
    pub created_at: DateTime<Utc>,
}

impl Row for User {
    const TABLE: &'static str = USERS_TABLE;
    type Key = UserId;

    fn key(&self) -> UserId {
        self.id
    }

    fn shard(&self) -> ShardableUuid {
        self.id.shard()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn index_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (BY_ORG, self.org_id.to_string()),
            (BY_EXTERNAL_USER, self.external_user_id.to_string()),
        ]
    }
}

/// Read-only lookups over the provisioned rows.
#[derive(Clone, Debug)]
pub struct DirectoryService {
    db: Arc<Database>,
}

impl DirectoryService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get_hospital(&self, id: HospitalId) -> CardioResult<Hospital> {
        self.db
            .read(|t| t.hospitals.get(&id).cloned())?
            .ok_or_else(|| CardioError::not_found("hospital", id))
    }

    /// The most recently created hospital of an organization.
    pub fn get_hospital_by_org(&self, org_id: &OrganizationId) -> CardioResult<Hospital> {
        self.db
            .read(|t| t.hospitals.latest_by(BY_ORG, org_id.as_str()).cloned())?
            .ok_or_else(|| CardioError::not_found("hospital", org_id))
    }

    pub fn get_doctor(&self, id: DoctorId) -> CardioResult<Doctor> {
        self.db
            .read(|t| t.doctors.get(&id).cloned())?
            .ok_or_else(|| CardioError::not_found("doctor", id))
    }

    pub fn get_doctor_by_user(&self, external_user_id: &ExternalUserId) -> CardioResult<Doctor> {
        self.db
            .read(|t| {
                t.doctors
                    .first_by(BY_EXTERNAL_USER, external_user_id.as_str())
                    .cloned()
            })?
            .ok_or_else(|| CardioError::not_found("doctor", external_user_id))
    }

    /// The caller's own user row, used to discover which organization they belong to.
    pub fn get_user(&self, external_user_id: &ExternalUserId) -> CardioResult<User> {
        self.db
            .read(|t| {
                t.users
                    .latest_by(BY_EXTERNAL_USER, external_user_id.as_str())
                    .cloned()
            })?
            .ok_or_else(|| CardioError::not_found("user", external_user_id))
    }
}
