//! Patient registry.
//!
//! Patients are created by doctors. Phone number, email address and national id number are
//! each unique across all patients; the uniqueness check and the insert run under one
//! database write, so two concurrent registrations cannot both claim the same value.

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::constants::{PATIENTS_TABLE, SCHEMA_VERSION};
use crate::ids::PatientId;
use crate::store::{Database, Row};
use crate::validation;
use crate::{CardioError, CardioResult};
use cardio_files::{BlobMetadata, BlobStore, Sha256Hash};
use cardio_types::{EmailAddress, NonEmptyText, PhoneNumber};
use cardio_uuid::ShardableUuid;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const BY_PHONE: &str = "phone";
const BY_EMAIL: &str = "email";
const BY_ID_NUMBER: &str = "id_number";

/// A patient field that must be unique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatientField {
    Phone,
    Email,
    IdNumber,
}

impl fmt::Display for PatientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::IdNumber => "idNumber",
        })
    }
}

/// Raw registration input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    /// `YYYY-MM-DD`.
    pub dob: String,
    pub email: String,
    pub phone: String,
    pub id_number: String,
    pub country: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    /// Reference returned by a previous image upload.
    pub profile_image: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub schema_version: u32,
    pub id: PatientId,
    pub name: NonEmptyText,
    pub dob: NaiveDate,
    pub email: EmailAddress,
    pub phone: PhoneNumber,
    pub id_number: NonEmptyText,
    pub country: NonEmptyText,
    pub city: NonEmptyText,
    pub state: NonEmptyText,
    pub zip_code: NonEmptyText,
    pub profile_image: Option<Sha256Hash>,
    pub created_at: DateTime<Utc>,
}

impl Row for Patient {
    const TABLE: &'static str = PATIENTS_TABLE;
    type Key = PatientId;

    fn key(&self) -> PatientId {
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
            (BY_PHONE, self.phone.to_string()),
            (BY_EMAIL, self.email.to_string()),
            (BY_ID_NUMBER, self.id_number.to_string()),
        ]
    }
}

/// A patient together with the public URL of their profile image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: Patient,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PatientService {
    db: Arc<Database>,
    blobs: BlobStore,
    cfg: Arc<CoreConfig>,
    clock: Arc<dyn Clock>,
}

impl PatientService {
    pub fn new(
        db: Arc<Database>,
        blobs: BlobStore,
        cfg: Arc<CoreConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            blobs,
            cfg,
            clock,
        }
    }

    /// Registers a patient.
    ///
    /// # Errors
    ///
    /// - [`CardioError::Validation`] for malformed input or an unknown image reference
    /// - [`CardioError::DuplicateField`] naming the first of phone, email, id number that is
    ///   already taken; no row is created
    pub fn create_patient(&self, input: &NewPatient) -> CardioResult<PatientId> {
        let now = self.clock.now();
        let patient = self.validate(input, now)?;
        let id = patient.id;

        self.db.write(|tx| {
            let patients = &tx.tables().patients;
            let taken = [
                (PatientField::Phone, BY_PHONE, patient.phone.as_str()),
                (PatientField::Email, BY_EMAIL, patient.email.as_str()),
                (PatientField::IdNumber, BY_ID_NUMBER, patient.id_number.as_str()),
            ]
            .into_iter()
            .find(|(_, index, value)| patients.first_by(index, value).is_some());

            if let Some((field, _, _)) = taken {
                return Err(CardioError::DuplicateField { field });
            }
            tx.put(patient);
            Ok(())
        })?;

        tracing::info!(patient_id = %id, "patient registered");
        Ok(id)
    }

    pub fn get_patient(&self, id: PatientId) -> CardioResult<PatientView> {
        let patient = self
            .db
            .read(|t| t.patients.get(&id).cloned())?
            .ok_or_else(|| CardioError::not_found("patient", id))?;
        Ok(self.view(patient))
    }

    /// Case-insensitive name search.
    ///
    /// A patient matches when every word of the query is a prefix of some word of their
    /// name, or when the whole query occurs inside the name. Results are sorted by name.
    pub fn search_patients(&self, query: &str) -> CardioResult<Vec<PatientView>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let terms: Vec<&str> = query.split_whitespace().collect();

        let mut found: Vec<Patient> = self.db.read(|t| {
            t.patients
                .iter()
                .filter(|p| name_matches(p.name.as_str(), &query, &terms))
                .cloned()
                .collect()
        })?;
        found.sort_by(|a, b| {
            a.name
                .as_str()
                .to_lowercase()
                .cmp(&b.name.as_str().to_lowercase())
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        Ok(found.into_iter().map(|p| self.view(p)).collect())
    }

    /// Stores a profile image and returns its reference.
    pub fn upload_image(&self, bytes: &[u8]) -> CardioResult<BlobMetadata> {
        let metadata = self.blobs.put(bytes)?;
        tracing::info!(hash = %metadata.hash, size = metadata.size_bytes, "image stored");
        Ok(metadata)
    }

    /// Bytes and detected media type of a stored image.
    pub fn image(&self, hash: &Sha256Hash) -> CardioResult<(Vec<u8>, Option<String>)> {
        let bytes = self.blobs.get(hash)?;
        let media_type = self.blobs.media_type(hash)?;
        Ok((bytes, media_type))
    }

    fn view(&self, patient: Patient) -> PatientView {
        let image_url = patient.profile_image.as_ref().map(|h| self.cfg.blob_url(h));
        PatientView { patient, image_url }
    }

    fn validate(&self, input: &NewPatient, now: DateTime<Utc>) -> CardioResult<Patient> {
        let dob = NaiveDate::parse_from_str(input.dob.trim(), "%Y-%m-%d")
            .map_err(|_| CardioError::validation("dob", "must be a date in YYYY-MM-DD form"))?;
        if dob > now.date_naive() {
            return Err(CardioError::validation("dob", "cannot be in the future"));
        }

        let profile_image = match input.profile_image.as_deref().map(str::trim) {
            Some(reference) if !reference.is_empty() => {
                let hash = Sha256Hash::parse(reference)
                    .map_err(|e| CardioError::validation("profile_image", e.to_string()))?;
                if !self.blobs.contains(&hash) {
                    return Err(CardioError::validation(
                        "profile_image",
                        "no uploaded image with this reference",
                    ));
                }
                Some(hash)
            }
            _ => None,
        };

        Ok(Patient {
            schema_version: SCHEMA_VERSION,
            id: PatientId::new(),
            name: validation::required("name", &input.name)?,
            dob,
            email: validation::email("email", &input.email)?,
            phone: validation::phone("phone", &input.phone)?,
            id_number: validation::required("id_number", &input.id_number)?,
            country: validation::required("country", &input.country)?,
            city: validation::place_name("city", &input.city)?,
            state: validation::place_name("state", &input.state)?,
            zip_code: validation::required("zip_code", &input.zip_code)?,
            profile_image,
            created_at: now,
        })
    }
}

fn name_matches(name: &str, query: &str, terms: &[&str]) -> bool {
    let name = name.to_lowercase();
    if name.contains(query) {
        return true;
    }
    let words: Vec<&str> = name.split_whitespace().collect();
    terms
        .iter()
        .all(|term| words.iter().any(|word| word.starts_with(term)))
}
