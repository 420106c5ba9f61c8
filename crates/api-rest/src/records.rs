use crate::error::ApiResult;
use crate::{parse_id, AppState};
use api_shared::{CreateRecordReq, ErrorRes, RecordRes, RiskAssessmentRes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use cardio_core::{NewRecord, RecordId};

#[utoipa::path(
    post,
    path = "/records",
    request_body = CreateRecordReq,
    responses(
        (status = 201, description = "Record stored", body = RiskAssessmentRes),
        (status = 200, description = "Dry run: risk computed, nothing stored", body = RiskAssessmentRes),
        (status = 400, description = "Measurement out of range", body = ErrorRes),
        (status = 402, description = "No active subscription for storing records", body = ErrorRes),
        (status = 403, description = "Plan's record limit reached", body = ErrorRes),
        (status = 404, description = "Unknown patient or doctor", body = ErrorRes)
    )
)]
/// Score a measurement set and, when `patient_id` is given, append it to the patient's history.
#[axum::debug_handler]
pub async fn create_record(
    State(state): State<AppState>,
    Json(req): Json<CreateRecordReq>,
) -> ApiResult<(StatusCode, Json<RiskAssessmentRes>)> {
    let input = NewRecord::try_from(req)?;
    let assessment = state.services.records.create_record(&input)?;
    let status = if assessment.record_id.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(RiskAssessmentRes::from(&assessment))))
}

#[utoipa::path(
    get,
    path = "/records/{id}",
    params(("id" = String, Path, description = "Record id")),
    responses(
        (status = 200, description = "Record", body = RecordRes),
        (status = 404, description = "Unknown record", body = ErrorRes)
    )
)]
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RecordRes>> {
    let id: RecordId = parse_id(&id)?;
    let record = state.services.records.get_patient_record(id)?;
    Ok(Json(RecordRes::from(&record)))
}
