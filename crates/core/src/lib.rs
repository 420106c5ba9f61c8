//! # Cardio Core
//!
//! Core business logic for the Cardio hospital platform.
//!
//! This crate contains the domain services and their storage:
//! - Hospital onboarding applications and the approval/provisioning workflow
//! - Hospitals, doctors and users created by approvals
//! - Patient registry with profile images
//! - Clinical records with risk scoring and trend classification
//! - Subscription billing
//!
//! **No API concerns**: HTTP servers, authentication and request parsing belong in
//! `api-rest` and `api-shared`.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod ids;
pub mod repositories;
pub mod risk;
pub mod services;
pub mod store;

mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{resolve_data_dir, CoreConfig};
pub use error::{CardioError, CardioResult};
pub use identity::{
    ClerkConfig, ClerkProvisioner, ExternalUserId, IdentityError, IdentityProvisioner,
    InMemoryProvisioner, OrganizationId, UnconfiguredProvisioner,
};
pub use ids::{ApplicationId, DoctorId, HospitalId, PatientId, RecordId, UserId};
pub use repositories::applications::{Application, ApplicationForm, ApplicationStatus};
pub use repositories::billing::{
    CardDetails, Payment, PaymentMethod, PlanType, SimulatedProcessor, SubscriptionState,
    SubscriptionStatus,
};
pub use repositories::directory::{Doctor, Hospital, User};
pub use repositories::patients::{NewPatient, Patient, PatientField, PatientView};
pub use repositories::provisioning::{Decision, DecisionOutcome, ProvisioningWorkflow};
pub use repositories::records::{NewRecord, Record, RiskAssessment};
pub use risk::{ConditionStatus, LogisticRiskModel, Measurements, RiskLevel, RiskModel};
pub use services::{CardioServices, ServiceOptions};
pub use store::Database;
