use crate::identity::IdentityError;
use crate::repositories::applications::ApplicationStatus;
use crate::repositories::billing::PlanType;
use crate::repositories::patients::PatientField;
use crate::repositories::provisioning::ProvisioningStep;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum CardioError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("a patient with this {field} already exists")]
    DuplicateField { field: PatientField },
    #[error("application {id} is already {from} and cannot be {to}")]
    InvalidTransition {
        id: String,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("provisioning failed at {step}: {source}")]
    ProvisioningFailed {
        step: ProvisioningStep,
        #[source]
        source: IdentityError,
    },
    #[error("organization already has an active {plan} subscription until {valid_until}")]
    AlreadySubscribed {
        plan: PlanType,
        valid_until: DateTime<Utc>,
    },
    #[error("payment was declined, please try again")]
    PaymentFailed,
    #[error("organization not found")]
    NotFoundOrg,
    #[error("an active subscription is required to store records")]
    SubscriptionRequired,
    #[error("the {plan} plan allows {limit} stored records")]
    PlanLimitReached { plan: PlanType, limit: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("storage lock poisoned")]
    LockPoisoned,
    #[error("storage I/O failed at {path}: {source}", path = path.display())]
    Storage {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize row: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid identifier: {0}")]
    Identifier(#[from] cardio_uuid::UuidError),
    #[error("blob storage error: {0}")]
    Files(#[from] cardio_files::FilesError),
}

impl CardioError {
    /// Builds a [`CardioError::Validation`] for `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn storage(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type CardioResult<T> = std::result::Result<T, CardioError>;
