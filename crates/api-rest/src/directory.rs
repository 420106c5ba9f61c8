use crate::error::ApiResult;
use crate::{parse_id, AppState};
use api_shared::{DoctorRes, ErrorRes, HospitalRes, UserRes};
use axum::extract::{Path, Query, State};
use axum::Json;
use cardio_core::{DoctorId, ExternalUserId, HospitalId, OrganizationId};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrgQuery {
    /// Identity provider organization id.
    pub org_id: String,
}

#[utoipa::path(
    get,
    path = "/hospitals",
    params(OrgQuery),
    responses(
        (status = 200, description = "The organization's hospital", body = HospitalRes),
        (status = 404, description = "No hospital for this organization", body = ErrorRes)
    )
)]
pub async fn get_hospital_by_org(
    State(state): State<AppState>,
    Query(query): Query<OrgQuery>,
) -> ApiResult<Json<HospitalRes>> {
    let org_id = OrganizationId::new(query.org_id.trim());
    let hospital = state.services.directory.get_hospital_by_org(&org_id)?;
    Ok(Json(HospitalRes::from(&hospital)))
}

#[utoipa::path(
    get,
    path = "/hospitals/{id}",
    params(("id" = String, Path, description = "Hospital id")),
    responses(
        (status = 200, description = "Hospital", body = HospitalRes),
        (status = 404, description = "Unknown hospital", body = ErrorRes)
    )
)]
pub async fn get_hospital(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<HospitalRes>> {
    let id: HospitalId = parse_id(&id)?;
    let hospital = state.services.directory.get_hospital(id)?;
    Ok(Json(HospitalRes::from(&hospital)))
}

#[utoipa::path(
    get,
    path = "/doctors/{id}",
    params(("id" = String, Path, description = "Doctor id")),
    responses(
        (status = 200, description = "Doctor", body = DoctorRes),
        (status = 404, description = "Unknown doctor", body = ErrorRes)
    )
)]
pub async fn get_doctor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DoctorRes>> {
    let id: DoctorId = parse_id(&id)?;
    let doctor = state.services.directory.get_doctor(id)?;
    Ok(Json(DoctorRes::from(&doctor)))
}

#[utoipa::path(
    get,
    path = "/users/{external_id}",
    params(("external_id" = String, Path, description = "Identity provider user id")),
    responses(
        (status = 200, description = "The user's organization link", body = UserRes),
        (status = 404, description = "Unknown user", body = ErrorRes)
    )
)]
/// "Me" lookup: which organization a signed-in user belongs to.
pub async fn get_user(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult<Json<UserRes>> {
    let user = state
        .services
        .directory
        .get_user(&ExternalUserId::new(external_id))?;
    Ok(Json(UserRes::from(&user)))
}

#[utoipa::path(
    get,
    path = "/users/{external_id}/doctor",
    params(("external_id" = String, Path, description = "Identity provider user id")),
    responses(
        (status = 200, description = "Doctor profile of the user", body = DoctorRes),
        (status = 404, description = "No doctor for this user", body = ErrorRes)
    )
)]
pub async fn get_doctor_by_user(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult<Json<DoctorRes>> {
    let doctor = state
        .services
        .directory
        .get_doctor_by_user(&ExternalUserId::new(external_id))?;
    Ok(Json(DoctorRes::from(&doctor)))
}
