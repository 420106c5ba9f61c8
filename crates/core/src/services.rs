//! Service wiring shared by the server and the CLI.

use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::identity::IdentityProvisioner;
use crate::repositories::applications::ApplicationService;
use crate::repositories::billing::{BillingLedger, PaymentProcessor, SimulatedProcessor};
use crate::repositories::directory::DirectoryService;
use crate::repositories::patients::PatientService;
use crate::repositories::provisioning::ProvisioningWorkflow;
use crate::repositories::records::RecordService;
use crate::risk::{LogisticRiskModel, RiskModel};
use crate::store::Database;
use crate::CardioResult;
use cardio_files::BlobStore;
use std::sync::Arc;
use std::time::Duration;

/// Every domain service, built over one database.
#[derive(Clone, Debug)]
pub struct CardioServices {
    pub applications: ApplicationService,
    pub provisioning: Arc<ProvisioningWorkflow>,
    pub directory: DirectoryService,
    pub patients: PatientService,
    pub records: RecordService,
    pub billing: BillingLedger,
}

/// Collaborators that differ between production and tests.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub clock: Arc<dyn Clock>,
    pub risk_model: Arc<dyn RiskModel>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub identity_timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            risk_model: Arc::new(LogisticRiskModel),
            processor: Arc::new(SimulatedProcessor::from_entropy()),
            identity_timeout: crate::constants::DEFAULT_IDENTITY_TIMEOUT,
        }
    }
}

impl CardioServices {
    /// Opens the database and blob store under the configured data directory.
    pub fn open(
        cfg: Arc<CoreConfig>,
        identity: Arc<dyn IdentityProvisioner>,
        options: ServiceOptions,
    ) -> CardioResult<Self> {
        let db = Arc::new(Database::open(cfg.data_dir())?);
        let blobs = BlobStore::open(cfg.data_dir())?;
        Ok(Self::with_database(db, blobs, cfg, identity, options))
    }

    pub fn with_database(
        db: Arc<Database>,
        blobs: BlobStore,
        cfg: Arc<CoreConfig>,
        identity: Arc<dyn IdentityProvisioner>,
        options: ServiceOptions,
    ) -> Self {
        let ServiceOptions {
            clock,
            risk_model,
            processor,
            identity_timeout,
        } = options;

        Self {
            applications: ApplicationService::new(db.clone(), clock.clone()),
            provisioning: Arc::new(
                ProvisioningWorkflow::new(db.clone(), identity, clock.clone())
                    .with_call_timeout(identity_timeout),
            ),
            directory: DirectoryService::new(db.clone()),
            patients: PatientService::new(db.clone(), blobs, cfg, clock.clone()),
            records: RecordService::new(db.clone(), risk_model, clock.clone()),
            billing: BillingLedger::new(db, processor, clock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::InMemoryProvisioner;
    use crate::repositories::applications::tests::sample_form;
    use crate::repositories::billing::{CardDetails, PaymentMethod, PlanType, SubscriptionState};
    use crate::repositories::patients::tests::new_patient;
    use crate::repositories::provisioning::Decision;
    use crate::repositories::records::NewRecord;
    use crate::risk::tests::at_risk;
    use crate::CardioError;
    use tempfile::TempDir;

    fn open(temp_dir: &TempDir) -> CardioServices {
        let cfg = CoreConfig::new(temp_dir.path().to_path_buf(), "http://localhost:3000")
            .expect("valid config");
        let options = ServiceOptions {
            processor: Arc::new(SimulatedProcessor::seeded(1)),
            ..ServiceOptions::default()
        };
        CardioServices::open(Arc::new(cfg), Arc::new(InMemoryProvisioner::new()), options)
            .expect("services should open")
    }

    #[tokio::test]
    async fn test_onboarding_to_subscription_survives_restart() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let services = open(&temp_dir);

        let application_id = services.applications.submit(&sample_form()).unwrap();
        let outcome = services
            .provisioning
            .decide(application_id, Decision::Approved)
            .await
            .unwrap();
        let hospital = services
            .directory
            .get_hospital(outcome.hospital_id.unwrap())
            .unwrap();
        let org_id = hospital.org_id.clone();

        let patient_id = services
            .patients
            .create_patient(&new_patient("Grace Hopper", 1))
            .unwrap();

        let card = CardDetails {
            card_number: "5555555555554444".into(),
            card_holder_name: "Amina Njoroge".into(),
            expiration_month: "12".into(),
            expiration_year: "2099".into(),
            cvc: "321".into(),
        };
        let declined = services
            .billing
            .add_payment(&org_id, PlanType::Standard, &card, PaymentMethod::Card);
        assert!(matches!(declined, Err(CardioError::PaymentFailed)));

        let mut paid = None;
        for _ in 0..20 {
            match services
                .billing
                .add_payment(&org_id, PlanType::Standard, &card, PaymentMethod::Card)
            {
                Ok(payment) => {
                    paid = Some(payment);
                    break;
                }
                Err(CardioError::PaymentFailed) => continue,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(paid.is_some(), "a retry should eventually succeed");

        let assessment = services
            .records
            .create_record(&NewRecord {
                measurements: at_risk(),
                notes: None,
                patient_id: Some(patient_id),
                doctor_id: None,
                org_id: org_id.clone(),
            })
            .unwrap();
        drop(services);

        let reopened = open(&temp_dir);
        let status = reopened
            .billing
            .check_subscription_status(Some(&org_id))
            .unwrap();
        assert_eq!(status.status, SubscriptionState::Active);
        assert_eq!(status.plan_type, PlanType::Standard);
        assert_eq!(
            reopened.directory.get_hospital_by_org(&org_id).unwrap(),
            hospital
        );
        let history = reopened.records.get_patient_records(patient_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(Some(history[0].id), assessment.record_id);

        let again = reopened
            .provisioning
            .decide(application_id, Decision::Approved)
            .await
            .unwrap();
        assert_eq!(again.hospital_id, outcome.hospital_id);
    }
}
