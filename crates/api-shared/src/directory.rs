use cardio_core::{Doctor, Hospital, User};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HospitalRes {
    pub id: String,
    pub org_id: String,
    pub application_id: String,
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
    pub created_at: String,
}

impl From<&Hospital> for HospitalRes {
    fn from(h: &Hospital) -> Self {
        let d = &h.details;
        Self {
            id: h.id.to_string(),
            org_id: h.org_id.to_string(),
            application_id: h.application_id.to_string(),
            name: d.name.to_string(),
            country: d.country.to_string(),
            city: d.city.to_string(),
            state: d.state.to_string(),
            postal_code: d.postal_code.to_string(),
            phone: d.phone.to_string(),
            email: d.email.to_string(),
            website: d.website.clone(),
            hospital_type: d.hospital_type.to_string(),
            registration_number: d.registration_number.to_string(),
            tax_id: d.tax_id.as_ref().map(ToString::to_string),
            doctor_name: h.doctor.name.to_string(),
            doctor_email: h.doctor.email.to_string(),
            created_at: h.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DoctorRes {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub specialization: String,
    pub license_number: String,
    pub org_id: String,
    pub external_user_id: String,
}

impl From<&Doctor> for DoctorRes {
    fn from(d: &Doctor) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.name.to_string(),
            email: d.email.to_string(),
            phone: d.phone.to_string(),
            specialization: d.specialization.to_string(),
            license_number: d.license_number.to_string(),
            org_id: d.org_id.to_string(),
            external_user_id: d.external_user_id.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UserRes {
    pub id: String,
    pub org_id: String,
    pub external_user_id: String,
}

impl From<&User> for UserRes {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.to_string(),
            org_id: u.org_id.to_string(),
            external_user_id: u.external_user_id.to_string(),
        }
    }
}
