use cardio_core::repositories::applications::ProvisioningProgress;
use cardio_core::{Application, ApplicationForm, DecisionOutcome};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Hospital registration form.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SubmitApplicationReq {
    pub name: String,
    pub country: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub website: Option<String>,
    pub hospital_type: String,
    pub registration_number: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    pub doctor_name: String,
    pub doctor_email: String,
    pub doctor_phone: String,
    pub specialization: String,
    pub license_number: String,
}

impl From<SubmitApplicationReq> for ApplicationForm {
    fn from(req: SubmitApplicationReq) -> Self {
        Self {
            name: req.name,
            country: req.country,
            city: req.city,
            state: req.state,
            postal_code: req.postal_code,
            phone: req.phone,
            email: req.email,
            website: req.website,
            hospital_type: req.hospital_type,
            registration_number: req.registration_number,
            tax_id: req.tax_id,
            doctor_name: req.doctor_name,
            doctor_email: req.doctor_email,
            doctor_phone: req.doctor_phone,
            specialization: req.specialization,
            license_number: req.license_number,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitApplicationRes {
    pub id: String,
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApplicationRes {
    pub id: String,
    pub status: String,
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
    /// Set while an approval is part-way through provisioning.
    pub provisioning: Option<ProvisioningRes>,
    pub created_at: String,
    pub decided_at: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProvisioningRes {
    pub external_user_id: Option<String>,
    pub org_id: Option<String>,
    pub invitation_sent: bool,
}

impl From<&ProvisioningProgress> for ProvisioningRes {
    fn from(p: &ProvisioningProgress) -> Self {
        Self {
            external_user_id: p.external_user_id.as_ref().map(ToString::to_string),
            org_id: p.org_id.as_ref().map(ToString::to_string),
            invitation_sent: p.invitation_sent,
        }
    }
}

impl From<&Application> for ApplicationRes {
    fn from(a: &Application) -> Self {
        let h = &a.hospital;
        let d = &a.doctor;
        Self {
            id: a.id.to_string(),
            status: a.status.to_string(),
            name: h.name.to_string(),
            country: h.country.to_string(),
            city: h.city.to_string(),
            state: h.state.to_string(),
            postal_code: h.postal_code.to_string(),
            phone: h.phone.to_string(),
            email: h.email.to_string(),
            website: h.website.clone(),
            hospital_type: h.hospital_type.to_string(),
            registration_number: h.registration_number.to_string(),
            tax_id: h.tax_id.as_ref().map(ToString::to_string),
            doctor_name: d.name.to_string(),
            doctor_email: d.email.to_string(),
            doctor_phone: d.phone.to_string(),
            specialization: d.specialization.to_string(),
            license_number: d.license_number.to_string(),
            provisioning: a.provisioning.as_ref().map(ProvisioningRes::from),
            created_at: a.created_at.to_rfc3339(),
            decided_at: a.decided_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListApplicationsRes {
    pub applications: Vec<ApplicationRes>,
}

/// `decision` is `approved` or `declined`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DecisionReq {
    pub decision: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DecisionRes {
    pub application_id: String,
    pub status: String,
    pub hospital_id: Option<String>,
}

impl From<&DecisionOutcome> for DecisionRes {
    fn from(o: &DecisionOutcome) -> Self {
        Self {
            application_id: o.application_id.to_string(),
            status: o.status.to_string(),
            hospital_id: o.hospital_id.map(|id| id.to_string()),
        }
    }
}
