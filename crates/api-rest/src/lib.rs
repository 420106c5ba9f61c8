//! # API REST
//!
//! REST API implementation for Cardio.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, admin API-key guard)
//!
//! Uses `api-shared` for request/response types and `cardio-core` for everything else.
//! The server binary builds an [`AppState`] and serves [`router`].

#![warn(rust_2018_idioms)]

pub mod applications;
pub mod billing;
pub mod directory;
pub mod error;
pub mod patients;
pub mod records;

use api_shared::{auth, HealthRes, HealthService, API_KEY_HEADER};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::{Json, Response};
use axum::routing::{get, post};
use axum::Router;
use cardio_core::{CardioError, CardioServices, CoreConfig};
use cardio_files::MAX_BLOB_BYTES;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

pub use error::{ApiError, ApiResult};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub services: CardioServices,
    pub cfg: Arc<CoreConfig>,
    admin_api_key: Arc<str>,
}

impl AppState {
    /// `admin_api_key` guards the `/admin` routes; an empty key locks them entirely.
    pub fn new(
        services: CardioServices,
        cfg: Arc<CoreConfig>,
        admin_api_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            services,
            cfg,
            admin_api_key: admin_api_key.into(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        applications::submit_application,
        applications::list_applications,
        applications::get_application,
        applications::decide_application,
        directory::get_hospital_by_org,
        directory::get_hospital,
        directory::get_doctor,
        directory::get_user,
        directory::get_doctor_by_user,
        patients::create_patient,
        patients::search_patients,
        patients::get_patient,
        patients::get_patient_records,
        patients::upload_file,
        patients::get_file,
        records::create_record,
        records::get_record,
        billing::add_payment,
        billing::list_payments,
        billing::check_subscription_status,
    ),
    components(schemas(
        HealthRes,
        api_shared::ErrorRes,
        api_shared::SubmitApplicationReq,
        api_shared::SubmitApplicationRes,
        api_shared::ApplicationRes,
        api_shared::ProvisioningRes,
        api_shared::ListApplicationsRes,
        api_shared::DecisionReq,
        api_shared::DecisionRes,
        api_shared::HospitalRes,
        api_shared::DoctorRes,
        api_shared::UserRes,
        api_shared::CreatePatientReq,
        api_shared::CreatePatientRes,
        api_shared::PatientRes,
        api_shared::SearchPatientsRes,
        api_shared::UploadFileRes,
        api_shared::CreateRecordReq,
        api_shared::RiskAssessmentRes,
        api_shared::RecordRes,
        api_shared::PatientRecordsRes,
        api_shared::AddPaymentReq,
        api_shared::PaymentRes,
        api_shared::PaymentsRes,
        api_shared::PlanFeaturesRes,
        api_shared::SubscriptionRes,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
            );
        }
    }
}

/// Builds the full REST router, Swagger UI included.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/applications", get(applications::list_applications))
        .route("/applications/:id", get(applications::get_application))
        .route(
            "/applications/:id/decision",
            post(applications::decide_application),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health))
        .route("/applications", post(applications::submit_application))
        .route("/hospitals", get(directory::get_hospital_by_org))
        .route("/hospitals/:id", get(directory::get_hospital))
        .route("/doctors/:id", get(directory::get_doctor))
        .route("/users/:external_id", get(directory::get_user))
        .route("/users/:external_id/doctor", get(directory::get_doctor_by_user))
        .route("/patients", post(patients::create_patient))
        .route("/patients/search", get(patients::search_patients))
        .route("/patients/:id", get(patients::get_patient))
        .route("/patients/:id/records", get(patients::get_patient_records))
        .route(
            "/files",
            post(patients::upload_file).layer(DefaultBodyLimit::max(MAX_BLOB_BYTES)),
        )
        .route("/files/:hash", get(patients::get_file))
        .route("/records", post(records::create_record))
        .route("/records/:id", get(records::get_record))
        .route(
            "/payments",
            post(billing::add_payment).get(billing::list_payments),
        )
        .route(
            "/subscriptions/:org_id",
            get(billing::check_subscription_status),
        )
        .nest("/admin", admin)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Rejects requests whose `x-api-key` header does not match the configured admin key.
async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    auth::validate_api_key(provided, &state.admin_api_key)?;
    Ok(next.run(request).await)
}

/// Parses a path identifier, reporting malformed ids as bad requests.
pub(crate) fn parse_id<T>(raw: &str) -> ApiResult<T>
where
    T: FromStr,
    CardioError: From<T::Err>,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::from(CardioError::from(e)))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use cardio_core::identity::ProvisionerCall;
    use cardio_core::{Database, InMemoryProvisioner, ServiceOptions, SimulatedProcessor};
    use cardio_files::BlobStore;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const ADMIN_KEY: &str = "test-admin-key";
    const PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00,
    ];

    struct TestApp {
        _dir: TempDir,
        router: Router,
        identity: Arc<InMemoryProvisioner>,
    }

    impl TestApp {
        fn new() -> Self {
            let dir = TempDir::new().expect("Failed to create temp dir");
            let cfg = Arc::new(
                CoreConfig::new(dir.path().to_path_buf(), "http://cardio.test/").expect("config"),
            );
            let identity = Arc::new(InMemoryProvisioner::new());
            let services = CardioServices::with_database(
                Arc::new(Database::in_memory()),
                BlobStore::open(dir.path()).expect("blob store"),
                cfg.clone(),
                identity.clone(),
                ServiceOptions {
                    processor: Arc::new(SimulatedProcessor::seeded(7)),
                    ..ServiceOptions::default()
                },
            );
            Self {
                _dir: dir,
                router: router(AppState::new(services, cfg, ADMIN_KEY)),
                identity,
            }
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            body: Option<Value>,
            api_key: Option<&str>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(key) = api_key {
                builder = builder.header(API_KEY_HEADER, key);
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Method::GET, uri, None, None).await
        }

        async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.send(Method::POST, uri, Some(body), None).await
        }

        async fn admin_post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.send(Method::POST, uri, Some(body), Some(ADMIN_KEY))
                .await
        }

        /// Submits and approves an application; returns its id and the new organization id.
        async fn onboard(&self) -> (String, String) {
            let (status, submitted) = self.post("/applications", application()).await;
            assert_eq!(status, StatusCode::CREATED);
            let id = submitted["id"].as_str().unwrap().to_string();

            let (status, outcome) = self
                .admin_post(
                    &format!("/admin/applications/{id}/decision"),
                    json!({ "decision": "approved" }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            let hospital_id = outcome["hospital_id"].as_str().unwrap();

            let (status, hospital) = self.get(&format!("/hospitals/{hospital_id}")).await;
            assert_eq!(status, StatusCode::OK);
            (id, hospital["org_id"].as_str().unwrap().to_string())
        }

        /// Pays for `plan`, retrying declined charges.
        async fn subscribe(&self, org_id: &str, plan: &str) {
            for _ in 0..20 {
                let (status, _) = self.post("/payments", card_payment(org_id, plan)).await;
                if status == StatusCode::CREATED {
                    return;
                }
                assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
            }
            panic!("payment for {plan} never went through");
        }
    }

    fn application() -> Value {
        json!({
            "name": "Lakeside Heart Institute",
            "country": "Kenya",
            "city": "Nairobi",
            "state": "Nairobi",
            "postal_code": "00100",
            "phone": "+254 20 555 0100",
            "email": "admin@lakeside.example",
            "website": "https://lakeside.example",
            "hospital_type": "Private",
            "registration_number": "REG-2201",
            "doctor_name": "Dr Wanjiru Kamau",
            "doctor_email": "w.kamau@lakeside.example",
            "doctor_phone": "+254 700 000 111",
            "specialization": "Cardiology",
            "license_number": "KMD-4410"
        })
    }

    fn patient(phone: &str, email: &str, id_number: &str) -> Value {
        json!({
            "name": "Ada Lovelace",
            "dob": "1985-12-10",
            "email": email,
            "phone": phone,
            "id_number": id_number,
            "country": "United Kingdom",
            "city": "London",
            "state": "Greater London",
            "zip_code": "NW1 6XE"
        })
    }

    fn measurements() -> Value {
        json!({
            "age": 63, "sex": 1, "cp": 3, "trtbps": 145, "chol": 233, "fbs": 1,
            "restecg": 0, "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 0,
            "ca": 0, "thal": 1
        })
    }

    fn card_payment(org_id: &str, plan: &str) -> Value {
        json!({
            "org_id": org_id,
            "plan_type": plan,
            "card_number": "4242 4242 4242 4242",
            "card_holder_name": "Wanjiru Kamau",
            "expiration_month": "12",
            "expiration_year": "2099",
            "cvc": "123"
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();
        let (status, body) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
    }

    #[tokio::test]
    async fn test_admin_routes_require_api_key() {
        let app = TestApp::new();

        let (status, body) = app.get("/admin/applications").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "missing API key");

        let (status, _) = app
            .send(Method::GET, "/admin/applications", None, Some("nope"))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app
            .send(Method::GET, "/admin/applications", None, Some(ADMIN_KEY))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applications"], json!([]));
    }

    #[tokio::test]
    async fn test_invalid_application_reports_field() {
        let app = TestApp::new();
        let mut form = application();
        form["doctor_email"] = json!("not-an-email");

        let (status, body) = app.post("/applications", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "doctor_email");
    }

    #[tokio::test]
    async fn test_approval_is_idempotent_and_final() {
        let app = TestApp::new();
        let (id, org_id) = app.onboard().await;

        let (status, again) = app
            .admin_post(
                &format!("/admin/applications/{id}/decision"),
                json!({ "decision": "approved" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["status"], "approved");
        assert_eq!(app.identity.calls(ProvisionerCall::CreateOrganization), 1);

        let (status, body) = app
            .admin_post(
                &format!("/admin/applications/{id}/decision"),
                json!({ "decision": "declined" }),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"].as_str().unwrap().contains("approved"));

        let (status, hospital) = app.get(&format!("/hospitals?org_id={org_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(hospital["name"], "Lakeside Heart Institute");

        let (status, detail) = app
            .send(
                Method::GET,
                &format!("/admin/applications/{id}"),
                None,
                Some(ADMIN_KEY),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["status"], "approved");
        assert!(detail["decided_at"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_decision_and_malformed_id_are_bad_requests() {
        let app = TestApp::new();
        let (status, submitted) = app.post("/applications", application()).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = submitted["id"].as_str().unwrap();

        let (status, body) = app
            .admin_post(
                &format!("/admin/applications/{id}/decision"),
                json!({ "decision": "maybe" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "decision");

        let (status, _) = app.get("/patients/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_patient_registration_search_and_image() {
        let app = TestApp::new();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/files")
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(PNG))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let upload: Value = serde_json::from_slice(&bytes).unwrap();
        let hash = upload["hash"].as_str().unwrap().to_string();
        assert_eq!(upload["url"], format!("http://cardio.test/files/{hash}"));

        let mut body = patient("+44 20 7946 0000", "ada@example.com", "AB123456C");
        body["profile_image"] = json!(hash);
        let (status, created) = app.post("/patients", body).await;
        assert_eq!(status, StatusCode::CREATED);
        let patient_id = created["id"].as_str().unwrap();

        let (status, dup) = app
            .post(
                "/patients",
                patient("+44 20 7946 0000", "other@example.com", "ZZ999999Z"),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(dup["field"], "phone");

        let (status, found) = app.get("/patients/search?name=ada%20lov").await;
        assert_eq!(status, StatusCode::OK);
        let patients = found["patients"].as_array().unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0]["id"], patient_id);
        assert_eq!(patients[0]["image_url"], upload["url"]);

        let (status, found) = app.get("/patients/search?name=").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["patients"], json!([]));

        let request = Request::builder()
            .uri(format!("/files/{hash}"))
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], PNG);
    }

    #[tokio::test]
    async fn test_records_dry_run_and_history() {
        let app = TestApp::new();
        let (_, org_id) = app.onboard().await;
        let (_, created) = app
            .post(
                "/patients",
                patient("+1 415 555 0101", "grace@example.com", "P-1"),
            )
            .await;
        let patient_id = created["id"].as_str().unwrap();

        let mut dry_run = measurements();
        dry_run["org_id"] = json!(org_id);
        let (status, assessment) = app.post("/records", dry_run.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(assessment["record_id"].is_null());

        let mut stored = dry_run;
        stored["patient_id"] = json!(patient_id);
        let (status, body) = app.post("/records", stored.clone()).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            body["message"],
            "an active subscription is required to store records"
        );

        app.subscribe(&org_id, "basic").await;
        let (status, _) = app.post("/records", stored.clone()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        app.subscribe(&org_id, "standard").await;
        let (status, first) = app.post("/records", stored).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["risk"], assessment["risk"]);
        assert_eq!(first["condition_status"], "still");

        let (status, history) = app.get(&format!("/patients/{patient_id}/records")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["records"][0]["id"], first["record_id"]);

        let record_id = first["record_id"].as_str().unwrap();
        let (status, record) = app.get(&format!("/records/{record_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["chol"], 233);

        let mut invalid = measurements();
        invalid["org_id"] = json!(org_id);
        invalid["ca"] = json!(9);
        let (status, body) = app.post("/records", invalid).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "ca");
    }

    #[tokio::test]
    async fn test_payment_flow() {
        let app = TestApp::new();

        let (status, _) = app
            .post("/payments", card_payment("org_unknown", "basic"))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, org_id) = app.onboard().await;
        let (status, _) = app.get(&format!("/subscriptions/{org_id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .post("/payments", card_payment(&org_id, "standard"))
            .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

        let mut paid = None;
        for _ in 0..20 {
            let (status, body) = app
                .post("/payments", card_payment(&org_id, "standard"))
                .await;
            if status == StatusCode::CREATED {
                paid = Some(body);
                break;
            }
            assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        }
        let paid = paid.expect("a retry should succeed");
        assert_eq!(paid["amount_cents"], 599);
        assert_eq!(paid["card_last4"], "4242");

        let (status, _) = app
            .post("/payments", card_payment(&org_id, "standard"))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, subscription) = app.get(&format!("/subscriptions/{org_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(subscription["status"], "active");
        assert_eq!(subscription["plan_type"], "standard");
        assert_eq!(subscription["features"]["record_limit"], 5000);

        let (status, listed) = app.get(&format!("/payments?org_id={org_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["payments"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let app = TestApp::new();
        let (status, doc) = app.get("/api-docs/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/admin/applications/{id}/decision"].is_object());
        assert!(doc["components"]["securitySchemes"]["api_key"].is_object());
    }
}
