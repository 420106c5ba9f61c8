//! Hospital onboarding: public submission and the admin review queue.

use crate::error::ApiResult;
use crate::{parse_id, AppState};
use api_shared::{
    ApplicationRes, DecisionReq, DecisionRes, ErrorRes, ListApplicationsRes, SubmitApplicationReq,
    SubmitApplicationRes,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use cardio_core::{ApplicationForm, ApplicationId, ApplicationStatus, Decision};

#[utoipa::path(
    post,
    path = "/applications",
    request_body = SubmitApplicationReq,
    responses(
        (status = 201, description = "Application received", body = SubmitApplicationRes),
        (status = 400, description = "Invalid form", body = ErrorRes)
    )
)]
/// Submit a hospital onboarding application.
///
/// The application starts `pending`; nothing is provisioned until an administrator approves it.
#[axum::debug_handler]
pub async fn submit_application(
    State(state): State<AppState>,
    Json(req): Json<SubmitApplicationReq>,
) -> ApiResult<(StatusCode, Json<SubmitApplicationRes>)> {
    let id = state
        .services
        .applications
        .submit(&ApplicationForm::from(req))?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitApplicationRes {
            id: id.to_string(),
            status: ApplicationStatus::Pending.to_string(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/admin/applications",
    responses(
        (status = 200, description = "All applications, oldest first", body = ListApplicationsRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes)
    ),
    security(("api_key" = []))
)]
#[axum::debug_handler]
pub async fn list_applications(
    State(state): State<AppState>,
) -> ApiResult<Json<ListApplicationsRes>> {
    let applications = state.services.applications.list()?;
    Ok(Json(ListApplicationsRes {
        applications: applications.iter().map(ApplicationRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/admin/applications/{id}",
    params(("id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "Application", body = ApplicationRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 404, description = "Unknown application", body = ErrorRes)
    ),
    security(("api_key" = []))
)]
#[axum::debug_handler]
pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApplicationRes>> {
    let id: ApplicationId = parse_id(&id)?;
    let application = state.services.applications.get(id)?;
    Ok(Json(ApplicationRes::from(&application)))
}

#[utoipa::path(
    post,
    path = "/admin/applications/{id}/decision",
    params(("id" = String, Path, description = "Application id")),
    request_body = DecisionReq,
    responses(
        (status = 200, description = "Decision applied, or already in effect", body = DecisionRes),
        (status = 400, description = "Unknown decision", body = ErrorRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 404, description = "Unknown application", body = ErrorRes),
        (status = 409, description = "Application already decided the other way", body = ErrorRes),
        (status = 502, description = "Identity provider call failed; safe to retry", body = ErrorRes)
    ),
    security(("api_key" = []))
)]
/// Approve or decline an application.
///
/// Approval provisions the identity account, organization, invitation and the hospital, doctor
/// and user rows. Repeating a decision returns the existing outcome without side effects.
#[axum::debug_handler]
pub async fn decide_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DecisionReq>,
) -> ApiResult<Json<DecisionRes>> {
    let id: ApplicationId = parse_id(&id)?;
    let decision: Decision = req.decision.parse()?;
    let outcome = state.services.provisioning.decide(id, decision).await?;
    Ok(Json(DecisionRes::from(&outcome)))
}
