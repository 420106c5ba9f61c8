//! Hospital onboarding applications.
//!
//! An application carries the hospital's details and its nominating doctor. It is created
//! `pending` and only ever leaves that state through the provisioning workflow
//! ([`crate::repositories::provisioning`]); [`ApplicationService::set_status`] exists for
//! administrative correction and never triggers provisioning itself.

use crate::clock::Clock;
use crate::constants::{APPLICATIONS_TABLE, SCHEMA_VERSION};
use crate::identity::{ExternalUserId, OrganizationId};
use crate::ids::ApplicationId;
use crate::store::{Database, Row};
use crate::validation;
use crate::{CardioError, CardioResult};
use cardio_types::{EmailAddress, NonEmptyText, PhoneNumber};
use cardio_uuid::ShardableUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Declined,
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
        })
    }
}

impl FromStr for ApplicationStatus {
    type Err = CardioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "declined" => Ok(Self::Declined),
            other => Err(CardioError::validation(
                "status",
                format!("unknown status {other:?}"),
            )),
        }
    }
}

/// Raw application input as submitted by the registration form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationForm {
    pub name: String,
    pub country: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: String,
    pub email: String,
    pub website: Option<String>,
    pub hospital_type: String,
    pub registration_number: String,
    pub tax_id: Option<String>,
    pub doctor_name: String,
    pub doctor_email: String,
    pub doctor_phone: String,
    pub specialization: String,
    pub license_number: String,
}

/// Validated hospital details; copied verbatim onto the Hospital row on approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HospitalDetails {
    pub name: NonEmptyText,
    pub country: NonEmptyText,
    pub city: NonEmptyText,
    pub state: NonEmptyText,
    pub postal_code: NonEmptyText,
    pub phone: PhoneNumber,
    pub email: EmailAddress,
    pub website: Option<String>,
    pub hospital_type: NonEmptyText,
    pub registration_number: NonEmptyText,
    pub tax_id: Option<NonEmptyText>,
}

/// The doctor nominated by an application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominatedDoctor {
    pub name: NonEmptyText,
    pub email: EmailAddress,
    pub phone: PhoneNumber,
    pub specialization: NonEmptyText,
    pub license_number: NonEmptyText,
}

impl ApplicationForm {
    /// Checks every field and returns the validated halves.
    pub fn validate(&self) -> CardioResult<(HospitalDetails, NominatedDoctor)> {
        let hospital = HospitalDetails {
            name: validation::required("name", &self.name)?,
            country: validation::required("country", &self.country)?,
            city: validation::place_name("city", &self.city)?,
            state: validation::place_name("state", &self.state)?,
            postal_code: validation::required("postal_code", &self.postal_code)?,
            phone: validation::phone("phone", &self.phone)?,
            email: validation::email("email", &self.email)?,
            website: validation::website("website", self.website.as_deref())?,
            hospital_type: validation::required("hospital_type", &self.hospital_type)?,
            registration_number: validation::required(
                "registration_number",
                &self.registration_number,
            )?,
            tax_id: validation::optional("tax_id", self.tax_id.as_deref())?,
        };
        let doctor = NominatedDoctor {
            name: validation::required("doctor_name", &self.doctor_name)?,
            email: validation::email("doctor_email", &self.doctor_email)?,
            phone: validation::phone("doctor_phone", &self.doctor_phone)?,
            specialization: validation::required("specialization", &self.specialization)?,
            license_number: validation::required("license_number", &self.license_number)?,
        };
        Ok((hospital, doctor))
    }
}

/// External identifiers obtained so far by an interrupted approval.
///
/// Saved after every successful primary call so a retried approval resumes instead of
/// creating a second account or organization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningProgress {
    pub external_user_id: Option<ExternalUserId>,
    pub org_id: Option<OrganizationId>,
    #[serde(default)]
    pub invitation_sent: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub schema_version: u32,
    pub id: ApplicationId,
    pub hospital: HospitalDetails,
    pub doctor: NominatedDoctor,
    pub status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning: Option<ProvisioningProgress>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Row for Application {
    const TABLE: &'static str = APPLICATIONS_TABLE;
    type Key = ApplicationId;

    fn key(&self) -> ApplicationId {
        self.id
    }

    fn shard(&self) -> ShardableUuid {
        self.id.shard()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Clone, Debug)]
pub struct ApplicationService {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl ApplicationService {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Validates and stores a new `pending` application.
    ///
    /// Duplicate submissions for the same hospital are accepted.
    pub fn submit(&self, form: &ApplicationForm) -> CardioResult<ApplicationId> {
        let (hospital, doctor) = form.validate()?;
        let application = Application {
            schema_version: SCHEMA_VERSION,
            id: ApplicationId::new(),
            hospital,
            doctor,
            status: ApplicationStatus::Pending,
            provisioning: None,
            created_at: self.clock.now(),
            decided_at: None,
        };
        let id = application.id;

        self.db.write(|tx| {
            tx.put(application);
            Ok(())
        })?;

        tracing::info!(application_id = %id, "application submitted");
        Ok(id)
    }

    pub fn get(&self, id: ApplicationId) -> CardioResult<Application> {
        self.db
            .read(|t| t.applications.get(&id).cloned())?
            .ok_or_else(|| CardioError::not_found("application", id))
    }

    /// All applications in submission order.
    pub fn list(&self) -> CardioResult<Vec<Application>> {
        self.db.read(|t| t.applications.iter().cloned().collect())
    }

    /// Unconditionally overwrites the status; performs no provisioning.
    pub fn set_status(&self, id: ApplicationId, status: ApplicationStatus) -> CardioResult<()> {
        let now = self.clock.now();
        self.db.write(|tx| {
            let mut application = tx
                .tables()
                .applications
                .get(&id)
                .cloned()
                .ok_or_else(|| CardioError::not_found("application", id))?;
            application.status = status;
            application.decided_at = match status {
                ApplicationStatus::Pending => None,
                _ => Some(now),
            };
            tx.put(application);
            Ok(())
        })?;

        tracing::info!(application_id = %id, %status, "application status set");
        Ok(())
    }
}
