//! Patient registry and profile images.

use crate::error::ApiResult;
use crate::{parse_id, AppState};
use api_shared::{
    CreatePatientReq, CreatePatientRes, ErrorRes, PatientRecordsRes, PatientRes, RecordRes,
    SearchPatientsRes, UploadFileRes,
};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cardio_core::{CardioError, NewPatient, PatientId};
use cardio_files::Sha256Hash;
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Name or name prefixes, case-insensitive.
    #[serde(default)]
    pub name: String,
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = CreatePatientReq,
    responses(
        (status = 201, description = "Patient registered", body = CreatePatientRes),
        (status = 400, description = "Invalid patient details", body = ErrorRes),
        (status = 409, description = "Phone, email or id number already registered", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<AppState>,
    Json(req): Json<CreatePatientReq>,
) -> ApiResult<(StatusCode, Json<CreatePatientRes>)> {
    let id = state
        .services
        .patients
        .create_patient(&NewPatient::from(req))?;
    Ok((
        StatusCode::CREATED,
        Json(CreatePatientRes { id: id.to_string() }),
    ))
}

#[utoipa::path(
    get,
    path = "/patients/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching patients sorted by name", body = SearchPatientsRes)
    )
)]
pub async fn search_patients(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchPatientsRes>> {
    let found = state.services.patients.search_patients(&query.name)?;
    Ok(Json(SearchPatientsRes {
        patients: found.iter().map(PatientRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient with image URL", body = PatientRes),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
pub async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PatientRes>> {
    let id: PatientId = parse_id(&id)?;
    let patient = state.services.patients.get_patient(id)?;
    Ok(Json(PatientRes::from(&patient)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/records",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Newest records first", body = PatientRecordsRes),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
pub async fn get_patient_records(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PatientRecordsRes>> {
    let id: PatientId = parse_id(&id)?;
    // 404 for unknown patients rather than an empty history
    state.services.patients.get_patient(id)?;
    let records = state.services.records.get_patient_records(id)?;
    Ok(Json(PatientRecordsRes {
        records: records.iter().map(RecordRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/files",
    request_body(content = Vec<u8>, description = "Raw image bytes", content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Stored; use `hash` as the patient's profile_image", body = UploadFileRes),
        (status = 400, description = "Empty upload", body = ErrorRes),
        (status = 413, description = "Upload too large")
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<UploadFileRes>)> {
    let metadata = state.services.patients.upload_image(&body)?;
    Ok((
        StatusCode::CREATED,
        Json(UploadFileRes {
            url: state.cfg.blob_url(&metadata.hash),
            hash: metadata.hash.to_string(),
            size_bytes: metadata.size_bytes,
            media_type: metadata.media_type,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/files/{hash}",
    params(("hash" = String, Path, description = "SHA-256 reference returned by the upload")),
    responses(
        (status = 200, description = "Blob bytes", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 400, description = "Malformed reference", body = ErrorRes),
        (status = 404, description = "Unknown reference", body = ErrorRes)
    )
)]
pub async fn get_file(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Response> {
    let hash = Sha256Hash::parse(&hash).map_err(CardioError::from)?;
    let (bytes, media_type) = state.services.patients.image(&hash)?;
    let content_type = media_type.unwrap_or_else(|| "application/octet-stream".into());
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
