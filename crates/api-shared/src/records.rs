use cardio_core::{
    CardioError, DoctorId, Measurements, NewRecord, OrganizationId, PatientId, Record,
    RiskAssessment,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Intake form. Without `patient_id` the risk is computed and nothing is stored.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRecordReq {
    pub age: u32,
    pub sex: u8,
    pub cp: u8,
    pub trtbps: u32,
    pub chol: u32,
    pub fbs: u8,
    pub restecg: u8,
    pub thalach: u32,
    pub exang: u8,
    pub oldpeak: f64,
    pub slope: u8,
    pub ca: u8,
    pub thal: u8,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub doctor_id: Option<String>,
    pub org_id: String,
}

impl CreateRecordReq {
    fn measurements(&self) -> Measurements {
        Measurements {
            age: self.age,
            sex: self.sex,
            cp: self.cp,
            trtbps: self.trtbps,
            chol: self.chol,
            fbs: self.fbs,
            restecg: self.restecg,
            thalach: self.thalach,
            exang: self.exang,
            oldpeak: self.oldpeak,
            slope: self.slope,
            ca: self.ca,
            thal: self.thal,
        }
    }
}

impl TryFrom<CreateRecordReq> for NewRecord {
    type Error = CardioError;

    fn try_from(req: CreateRecordReq) -> Result<Self, Self::Error> {
        if req.org_id.trim().is_empty() {
            return Err(CardioError::validation("org_id", "is required"));
        }
        let patient_id = req
            .patient_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<PatientId>)
            .transpose()?;
        let doctor_id = req
            .doctor_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<DoctorId>)
            .transpose()?;
        Ok(Self {
            measurements: req.measurements(),
            notes: req.notes,
            patient_id,
            doctor_id,
            org_id: OrganizationId::new(req.org_id.trim()),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RiskAssessmentRes {
    pub risk: f64,
    /// `low`, `moderate` or `high`.
    pub risk_level: String,
    pub record_id: Option<String>,
    /// `still`, `improved` or `deteriorated`; absent for dry runs.
    pub condition_status: Option<String>,
}

impl From<&RiskAssessment> for RiskAssessmentRes {
    fn from(a: &RiskAssessment) -> Self {
        Self {
            risk: a.risk,
            risk_level: enum_name(&a.risk_level),
            record_id: a.record_id.map(|id| id.to_string()),
            condition_status: a.condition_status.as_ref().map(enum_name),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordRes {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub org_id: String,
    pub age: u32,
    pub sex: u8,
    pub cp: u8,
    pub trtbps: u32,
    pub chol: u32,
    pub fbs: u8,
    pub restecg: u8,
    pub thalach: u32,
    pub exang: u8,
    pub oldpeak: f64,
    pub slope: u8,
    pub ca: u8,
    pub thal: u8,
    pub notes: Option<String>,
    pub risk: f64,
    pub condition_status: String,
    pub model: String,
    pub created_at: String,
}

impl From<&Record> for RecordRes {
    fn from(r: &Record) -> Self {
        let m = &r.measurements;
        Self {
            id: r.id.to_string(),
            patient_id: r.patient_id.to_string(),
            doctor_id: r.doctor_id.map(|id| id.to_string()),
            org_id: r.org_id.to_string(),
            age: m.age,
            sex: m.sex,
            cp: m.cp,
            trtbps: m.trtbps,
            chol: m.chol,
            fbs: m.fbs,
            restecg: m.restecg,
            thalach: m.thalach,
            exang: m.exang,
            oldpeak: m.oldpeak,
            slope: m.slope,
            ca: m.ca,
            thal: m.thal,
            notes: r.notes.clone(),
            risk: r.risk,
            condition_status: enum_name(&r.condition_status),
            model: r.model.clone(),
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientRecordsRes {
    pub records: Vec<RecordRes>,
}

/// The serde name of a unit enum variant.
pub(crate) fn enum_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}
