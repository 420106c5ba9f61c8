use cardio_core::{NewPatient, PatientView};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreatePatientReq {
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
    /// Hash returned by `POST /files`.
    #[serde(default)]
    pub profile_image: Option<String>,
}

impl From<CreatePatientReq> for NewPatient {
    fn from(req: CreatePatientReq) -> Self {
        Self {
            name: req.name,
            dob: req.dob,
            email: req.email,
            phone: req.phone,
            id_number: req.id_number,
            country: req.country,
            city: req.city,
            state: req.state,
            zip_code: req.zip_code,
            profile_image: req.profile_image,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePatientRes {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientRes {
    pub id: String,
    pub name: String,
    pub dob: String,
    pub email: String,
    pub phone: String,
    pub id_number: String,
    pub country: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub profile_image: Option<String>,
    pub image_url: Option<String>,
    pub created_at: String,
}

impl From<&PatientView> for PatientRes {
    fn from(v: &PatientView) -> Self {
        let p = &v.patient;
        Self {
            id: p.id.to_string(),
            name: p.name.to_string(),
            dob: p.dob.format("%Y-%m-%d").to_string(),
            email: p.email.to_string(),
            phone: p.phone.to_string(),
            id_number: p.id_number.to_string(),
            country: p.country.to_string(),
            city: p.city.to_string(),
            state: p.state.to_string(),
            zip_code: p.zip_code.to_string(),
            profile_image: p.profile_image.as_ref().map(ToString::to_string),
            image_url: v.image_url.clone(),
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchPatientsRes {
    pub patients: Vec<PatientRes>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadFileRes {
    pub hash: String,
    pub size_bytes: u64,
    pub media_type: Option<String>,
    pub url: String,
}
