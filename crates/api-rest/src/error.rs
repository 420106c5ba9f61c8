//! Mapping from domain errors to HTTP responses.

use api_shared::auth::AuthError;
use api_shared::ErrorRes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cardio_core::CardioError;
use cardio_files::FilesError;

#[derive(Debug)]
pub enum ApiError {
    Domain(CardioError),
    Unauthorized(AuthError),
}

impl From<CardioError> for ApiError {
    fn from(e: CardioError) -> Self {
        Self::Domain(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Unauthorized(e)
    }
}

impl ApiError {
    fn status_and_body(&self) -> (StatusCode, ErrorRes) {
        let Self::Domain(e) = self else {
            return (StatusCode::UNAUTHORIZED, ErrorRes::new(self.message()));
        };
        match e {
            CardioError::Validation { field, .. } => (
                StatusCode::BAD_REQUEST,
                ErrorRes::new(e.to_string()).with_field(field.clone()),
            ),
            CardioError::Identifier(_) => (StatusCode::BAD_REQUEST, ErrorRes::new(e.to_string())),
            CardioError::NotFound { .. } | CardioError::NotFoundOrg => {
                (StatusCode::NOT_FOUND, ErrorRes::new(e.to_string()))
            }
            CardioError::DuplicateField { field } => (
                StatusCode::CONFLICT,
                ErrorRes::new(e.to_string()).with_field(field.to_string()),
            ),
            CardioError::InvalidTransition { .. } | CardioError::AlreadySubscribed { .. } => {
                (StatusCode::CONFLICT, ErrorRes::new(e.to_string()))
            }
            CardioError::PaymentFailed | CardioError::SubscriptionRequired => {
                (StatusCode::PAYMENT_REQUIRED, ErrorRes::new(e.to_string()))
            }
            CardioError::PlanLimitReached { .. } => {
                (StatusCode::FORBIDDEN, ErrorRes::new(e.to_string()))
            }
            CardioError::ProvisioningFailed { .. } => {
                (StatusCode::BAD_GATEWAY, ErrorRes::new(e.to_string()))
            }
            CardioError::Files(FilesError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, ErrorRes::new("file not found"))
            }
            CardioError::Files(FilesError::InvalidBlob(_) | FilesError::Reference(_)) => {
                (StatusCode::BAD_REQUEST, ErrorRes::new(e.to_string()))
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorRes::new("Internal error"),
            ),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Domain(e) => e.to_string(),
            Self::Unauthorized(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!(status = %status, error = ?self, "request failed");
        } else {
            tracing::warn!(status = %status, error = %self.message(), "request rejected");
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cardio_core::{PatientField, PlanType};

    fn status_of(e: CardioError) -> (StatusCode, ErrorRes) {
        ApiError::from(e).status_and_body()
    }

    #[test]
    fn test_duplicate_field_maps_to_conflict_with_field() {
        let (status, body) = status_of(CardioError::DuplicateField {
            field: PatientField::IdNumber,
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.field.as_deref(), Some("idNumber"));
    }

    #[test]
    fn test_error_taxonomy_status_codes() {
        assert_eq!(
            status_of(CardioError::validation("email", "bad")).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(CardioError::NotFoundOrg).0, StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(CardioError::PaymentFailed).0,
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(CardioError::SubscriptionRequired).0,
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(CardioError::PlanLimitReached {
                plan: PlanType::Basic,
                limit: 0
            })
            .0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(CardioError::LockPoisoned).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(AuthError::Missing).status_and_body().0,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_internal_errors_do_not_leak_details() {
        let (_, body) = status_of(CardioError::Config("secret path".into()));
        assert_eq!(body.message, "Internal error");
    }
}
