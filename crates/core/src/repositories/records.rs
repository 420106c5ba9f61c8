//! Clinical records: one risk assessment per measurement set.
//!
//! Records are append-only. Each record's trend label compares its risk with the patient's
//! previous record at the time of insertion and is never recomputed. Scoring is open to every
//! caller; storing a record counts against the organization's plan.

use crate::clock::Clock;
use crate::constants::{RECORDS_TABLE, RECORD_PAGE_SIZE, SCHEMA_VERSION};
use crate::identity::OrganizationId;
use crate::ids::{DoctorId, PatientId, RecordId};
use crate::repositories::billing::ensure_record_allowance;
use crate::repositories::directory::BY_ORG;
use crate::risk::{ConditionStatus, Measurements, RiskLevel, RiskModel};
use crate::store::{Database, Row};
use crate::{CardioError, CardioResult};
use cardio_uuid::ShardableUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const BY_PATIENT: &str = "patient_id";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    #[serde(flatten)]
    pub measurements: Measurements,
    pub notes: Option<String>,
    /// Absent for a dry run: the risk is computed but nothing is stored.
    pub patient_id: Option<PatientId>,
    pub doctor_id: Option<DoctorId>,
    pub org_id: OrganizationId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub schema_version: u32,
    pub id: RecordId,
    pub patient_id: PatientId,
    pub doctor_id: Option<DoctorId>,
    pub org_id: OrganizationId,
    #[serde(flatten)]
    pub measurements: Measurements,
    pub notes: Option<String>,
    pub risk: f64,
    pub condition_status: ConditionStatus,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl Row for Record {
    const TABLE: &'static str = RECORDS_TABLE;
    type Key = RecordId;

    fn key(&self) -> RecordId {
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
            (BY_PATIENT, self.patient_id.to_string()),
            (BY_ORG, self.org_id.to_string()),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub risk: f64,
    pub risk_level: RiskLevel,
    /// `None` for dry runs.
    pub record_id: Option<RecordId>,
    pub condition_status: Option<ConditionStatus>,
}

#[derive(Clone, Debug)]
pub struct RecordService {
    db: Arc<Database>,
    model: Arc<dyn RiskModel>,
    clock: Arc<dyn Clock>,
}

impl RecordService {
    pub fn new(db: Arc<Database>, model: Arc<dyn RiskModel>, clock: Arc<dyn Clock>) -> Self {
        Self { db, model, clock }
    }

    /// Scores a measurement set and, when a patient is given, stores it as a new record.
    ///
    /// # Errors
    ///
    /// - [`CardioError::Validation`] if a measurement is out of range
    /// - [`CardioError::NotFound`] if the patient or doctor does not exist
    /// - [`CardioError::SubscriptionRequired`] if the organization has no active subscription
    /// - [`CardioError::PlanLimitReached`] if its plan cannot store another record
    pub fn create_record(&self, input: &NewRecord) -> CardioResult<RiskAssessment> {
        input.measurements.validate()?;
        let risk = self.model.score(&input.measurements);
        let risk_level = RiskLevel::from_risk(risk);

        let Some(patient_id) = input.patient_id else {
            return Ok(RiskAssessment {
                risk,
                risk_level,
                record_id: None,
                condition_status: None,
            });
        };

        let notes = input
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let now = self.clock.now();

        let record = self.db.write(|tx| {
            let tables = tx.tables();
            if !tables.patients.contains(&patient_id) {
                return Err(CardioError::not_found("patient", patient_id));
            }
            if let Some(doctor_id) = input.doctor_id {
                if !tables.doctors.contains(&doctor_id) {
                    return Err(CardioError::not_found("doctor", doctor_id));
                }
            }
            ensure_record_allowance(tables, &input.org_id, now)?;

            let previous = tables
                .records
                .latest_by(BY_PATIENT, &patient_id.to_string())
                .map(|r| r.risk);
            let id = RecordId::from_timestamp_id(self.db.next_log_id(now));
            let record = Record {
                schema_version: SCHEMA_VERSION,
                id,
                patient_id,
                doctor_id: input.doctor_id,
                org_id: input.org_id.clone(),
                measurements: input.measurements,
                notes,
                risk,
                condition_status: ConditionStatus::classify(previous, risk),
                model: self.model.name().to_string(),
                created_at: id.timestamp_id().timestamp(),
            };
            tx.put(record.clone());
            Ok(record)
        })?;

        tracing::info!(
            record_id = %record.id,
            patient_id = %patient_id,
            risk = record.risk,
            condition = ?record.condition_status,
            "record created"
        );

        Ok(RiskAssessment {
            risk,
            risk_level,
            record_id: Some(record.id),
            condition_status: Some(record.condition_status),
        })
    }

    /// The patient's newest records first, at most [`RECORD_PAGE_SIZE`].
    pub fn get_patient_records(&self, patient_id: PatientId) -> CardioResult<Vec<Record>> {
        self.db.read(|t| {
            t.records
                .lookup(BY_PATIENT, &patient_id.to_string())
                .rev()
                .take(RECORD_PAGE_SIZE)
                .cloned()
                .collect()
        })
    }

    pub fn get_patient_record(&self, id: RecordId) -> CardioResult<Record> {
        self.db
            .read(|t| t.records.get(&id).cloned())?
            .ok_or_else(|| CardioError::not_found("record", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::repositories::billing::tests::seed_payment;
    use crate::repositories::billing::PlanType;
    use crate::repositories::patients::tests::{new_patient, service as patient_service};
    use crate::risk::tests::{at_risk, healthy};
    use crate::risk::LogisticRiskModel;
    use tempfile::TempDir;

    /// Returns the scores it is given, in order.
    #[derive(Debug)]
    struct ScriptedModel(std::sync::Mutex<Vec<f64>>);

    impl RiskModel for ScriptedModel {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn score(&self, _: &Measurements) -> f64 {
            self.0.lock().unwrap().remove(0)
        }
    }

    fn org() -> OrganizationId {
        OrganizationId::new("org_test")
    }

    fn new_record(patient_id: Option<PatientId>, measurements: Measurements) -> NewRecord {
        NewRecord {
            measurements,
            notes: Some("  follow up in 3 months ".into()),
            patient_id,
            doctor_id: None,
            org_id: org(),
        }
    }

    fn setup(model: Arc<dyn RiskModel>) -> (TempDir, RecordService, PatientId) {
        setup_with_plan(model, Some(PlanType::Premium))
    }

    fn setup_with_plan(
        model: Arc<dyn RiskModel>,
        plan: Option<PlanType>,
    ) -> (TempDir, RecordService, PatientId) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Arc::new(Database::in_memory());
        let patients = patient_service(&temp_dir, db.clone());
        let patient_id = patients
            .create_patient(&new_patient("Grace Hopper", 1))
            .unwrap();
        if let Some(plan) = plan {
            seed_payment(&db, &org(), plan, Utc::now());
        }
        let records = RecordService::new(db, model, Arc::new(SystemClock));
        (temp_dir, records, patient_id)
    }

    #[test]
    fn test_dry_run_stores_nothing() {
        let (_dir, records, patient_id) = setup(Arc::new(LogisticRiskModel));

        let assessment = records.create_record(&new_record(None, at_risk())).unwrap();

        assert_eq!(assessment.record_id, None);
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert!(records.get_patient_records(patient_id).unwrap().is_empty());
    }

    #[test]
    fn test_trend_follows_previous_risk() {
        let scores = vec![40.0, 55.5, 55.5, 20.0, 35.0];
        let model = Arc::new(ScriptedModel(std::sync::Mutex::new(scores.clone())));
        let (_dir, records, patient_id) = setup(model);

        for _ in &scores {
            records
                .create_record(&new_record(Some(patient_id), healthy()))
                .unwrap();
        }

        let history = records.get_patient_records(patient_id).unwrap();
        let trend: Vec<_> = history
            .iter()
            .rev()
            .map(|r| (r.risk, r.condition_status))
            .collect();
        assert_eq!(
            trend,
            vec![
                (40.0, ConditionStatus::Still),
                (55.5, ConditionStatus::Deteriorated),
                (55.5, ConditionStatus::Still),
                (20.0, ConditionStatus::Improved),
                (35.0, ConditionStatus::Deteriorated),
            ]
        );
    }

    #[test]
    fn test_history_is_newest_first_and_bounded() {
        let (_dir, records, patient_id) = setup(Arc::new(LogisticRiskModel));

        let mut ids = Vec::new();
        for _ in 0..(RECORD_PAGE_SIZE + 5) {
            let created = records
                .create_record(&new_record(Some(patient_id), healthy()))
                .unwrap();
            ids.push(created.record_id.expect("stored"));
        }

        let history = records.get_patient_records(patient_id).unwrap();
        assert_eq!(history.len(), RECORD_PAGE_SIZE);
        assert_eq!(history[0].id, *ids.last().unwrap());
        assert!(history.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[test]
    fn test_record_round_trip_and_notes_trimmed() {
        let (_dir, records, patient_id) = setup(Arc::new(LogisticRiskModel));
        let assessment = records
            .create_record(&new_record(Some(patient_id), at_risk()))
            .unwrap();

        let record = records
            .get_patient_record(assessment.record_id.unwrap())
            .unwrap();
        assert_eq!(record.risk, assessment.risk);
        assert_eq!(record.measurements, at_risk());
        assert_eq!(record.notes.as_deref(), Some("follow up in 3 months"));
        assert_eq!(record.model, "logistic-v1");
        assert_eq!(record.org_id, org());
    }

    #[test]
    fn test_unknown_patient_is_not_found() {
        let (_dir, records, _) = setup(Arc::new(LogisticRiskModel));
        let err = records
            .create_record(&new_record(Some(PatientId::new()), healthy()))
            .expect_err("patient missing");
        assert!(matches!(err, CardioError::NotFound { entity: "patient", .. }));
    }

    #[test]
    fn test_unknown_doctor_is_not_found() {
        let (_dir, records, patient_id) = setup(Arc::new(LogisticRiskModel));
        let mut input = new_record(Some(patient_id), healthy());
        input.doctor_id = Some(DoctorId::new());

        let err = records.create_record(&input).expect_err("doctor missing");
        assert!(matches!(err, CardioError::NotFound { entity: "doctor", .. }));
    }

    #[test]
    fn test_invalid_measurements_are_rejected() {
        let (_dir, records, patient_id) = setup(Arc::new(LogisticRiskModel));
        let mut m = healthy();
        m.thal = 3;

        let err = records
            .create_record(&new_record(Some(patient_id), m))
            .expect_err("thal out of range");
        assert!(matches!(err, CardioError::Validation { .. }));
        assert!(records.get_patient_records(patient_id).unwrap().is_empty());
    }

    #[test]
    fn test_storing_requires_a_subscription() {
        let (_dir, records, patient_id) = setup_with_plan(Arc::new(LogisticRiskModel), None);

        let err = records
            .create_record(&new_record(Some(patient_id), healthy()))
            .expect_err("never paid");
        assert!(matches!(err, CardioError::SubscriptionRequired));

        let dry_run = records.create_record(&new_record(None, healthy())).unwrap();
        assert_eq!(dry_run.record_id, None);
    }

    #[test]
    fn test_expired_subscription_cannot_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Arc::new(Database::in_memory());
        let patient_id = patient_service(&temp_dir, db.clone())
            .create_patient(&new_patient("Grace Hopper", 1))
            .unwrap();
        let paid_at = Utc::now() - chrono::Duration::days(31);
        seed_payment(&db, &org(), PlanType::Premium, paid_at);
        let records = RecordService::new(db, Arc::new(LogisticRiskModel), Arc::new(SystemClock));

        let err = records
            .create_record(&new_record(Some(patient_id), healthy()))
            .expect_err("window closed");
        assert!(matches!(err, CardioError::SubscriptionRequired));
    }

    #[test]
    fn test_basic_plan_is_prediction_only() {
        let (_dir, records, patient_id) =
            setup_with_plan(Arc::new(LogisticRiskModel), Some(PlanType::Basic));

        let err = records
            .create_record(&new_record(Some(patient_id), healthy()))
            .expect_err("basic stores nothing");
        assert!(matches!(
            err,
            CardioError::PlanLimitReached {
                plan: PlanType::Basic,
                limit: 0
            }
        ));
        assert!(records.get_patient_records(patient_id).unwrap().is_empty());
        assert!(records.create_record(&new_record(None, healthy())).is_ok());
    }

    #[test]
    fn test_standard_plan_limit_is_enforced() {
        let (_dir, records, patient_id) =
            setup_with_plan(Arc::new(LogisticRiskModel), Some(PlanType::Standard));
        let limit = PlanType::Standard
            .features()
            .record_limit
            .expect("standard is limited");

        let now = Utc::now();
        let db = records.db.clone();
        db.write(|tx| {
            for _ in 0..limit {
                let id = RecordId::from_timestamp_id(db.next_log_id(now));
                tx.put(Record {
                    schema_version: SCHEMA_VERSION,
                    id,
                    patient_id,
                    doctor_id: None,
                    org_id: org(),
                    measurements: healthy(),
                    notes: None,
                    risk: 10.0,
                    condition_status: ConditionStatus::Still,
                    model: "seeded".into(),
                    created_at: now,
                });
            }
            Ok(())
        })
        .unwrap();

        let err = records
            .create_record(&new_record(Some(patient_id), healthy()))
            .expect_err("limit used up");
        assert!(matches!(
            err,
            CardioError::PlanLimitReached {
                plan: PlanType::Standard,
                limit: 5_000
            }
        ));

        let other_org = NewRecord {
            org_id: OrganizationId::new("org_other"),
            ..new_record(Some(patient_id), healthy())
        };
        assert!(matches!(
            records.create_record(&other_org),
            Err(CardioError::SubscriptionRequired)
        ));
    }
}
