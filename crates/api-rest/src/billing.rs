use crate::directory::OrgQuery;
use crate::error::ApiResult;
use crate::AppState;
use api_shared::{AddPaymentReq, ErrorRes, PaymentCommand, PaymentRes, PaymentsRes, SubscriptionRes};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use cardio_core::OrganizationId;

#[utoipa::path(
    post,
    path = "/payments",
    request_body = AddPaymentReq,
    responses(
        (status = 201, description = "Payment recorded; subscription active for 30 days", body = PaymentRes),
        (status = 400, description = "Invalid card or plan", body = ErrorRes),
        (status = 402, description = "Payment declined; retry", body = ErrorRes),
        (status = 404, description = "Unknown organization", body = ErrorRes),
        (status = 409, description = "Same plan already active", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn add_payment(
    State(state): State<AppState>,
    Json(req): Json<AddPaymentReq>,
) -> ApiResult<(StatusCode, Json<PaymentRes>)> {
    let cmd = PaymentCommand::try_from(req)?;
    let payment =
        state
            .services
            .billing
            .add_payment(&cmd.org_id, cmd.plan_type, &cmd.card, cmd.method)?;
    Ok((StatusCode::CREATED, Json(PaymentRes::from(&payment))))
}

#[utoipa::path(
    get,
    path = "/payments",
    params(OrgQuery),
    responses(
        (status = 200, description = "Payments, newest first", body = PaymentsRes)
    )
)]
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<OrgQuery>,
) -> ApiResult<Json<PaymentsRes>> {
    let org_id = OrganizationId::new(query.org_id.trim());
    let payments = state.services.billing.payments(&org_id)?;
    Ok(Json(PaymentsRes {
        payments: payments.iter().map(PaymentRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/subscriptions/{org_id}",
    params(("org_id" = String, Path, description = "Identity provider organization id")),
    responses(
        (status = 200, description = "Subscription derived from the latest payment", body = SubscriptionRes),
        (status = 404, description = "Organization has never paid", body = ErrorRes)
    )
)]
pub async fn check_subscription_status(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> ApiResult<Json<SubscriptionRes>> {
    let org_id = OrganizationId::new(org_id.trim());
    let status = state
        .services
        .billing
        .check_subscription_status(Some(&org_id))?;
    Ok(Json(SubscriptionRes::from(&status)))
}
