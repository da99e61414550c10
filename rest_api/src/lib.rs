// rest_api/src/lib.rs
use axum::{
    Json, Router,
    extract::{FromRef, Query, State, rejection::JsonRejection},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use anyhow::{Context, Error as AnyhowError};
use lib::{
    BookingOutcome, CallLimits, ClinicDeps, ClinicServices, IngestRequest, Upload, create_storage,
};
use models::errors::{ErrorKind, PortalError, ValidationError};
use models::medical::{
    Appointment, AppointmentRequest, AppointmentView, BookingRequest, Doctor, MedicalRecord, NewPatient, Patient,
};
use models::stats::DashboardStats;
use models::timestamps::Zone;
use security::{
    AccountRegistration, AccountStore, AuthError, IdentityOracle, InMemoryAccountStore, JwtConfig,
    LocalIdentityOracle, Permission, Portal, RolesConfig, SessionCaller, Session, SledAccountStore, UserLogin,
    login_for_portal,
};

pub mod config;
use crate::config::PortalConfig;

/// An error on its way to the client. Every variant maps to one status code
/// and a `{error, details?, hint?}` body.
#[derive(Debug, Error)]
pub enum RestApiError {
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl From<AuthError> for RestApiError {
    fn from(err: AuthError) -> Self {
        RestApiError::Portal(err.into())
    }
}

impl From<ValidationError> for RestApiError {
    fn from(err: ValidationError) -> Self {
        RestApiError::Portal(err.into())
    }
}

impl From<JsonRejection> for RestApiError {
    fn from(rejection: JsonRejection) -> Self {
        RestApiError::InvalidBody(rejection.body_text())
    }
}

fn validation_details(err: &ValidationError) -> Option<Value> {
    match err {
        ValidationError::MissingField(field) | ValidationError::InvalidField { field, .. } => {
            Some(json!({ "field": field }))
        }
        ValidationError::UnknownDoctor(id) => Some(json!({ "doctor_id": id })),
        ValidationError::UnknownPatient(id) => Some(json!({ "patient_id": id })),
        _ => None,
    }
}

impl IntoResponse for RestApiError {
    fn into_response(self) -> Response {
        let err = match self {
            RestApiError::InvalidBody(msg) => {
                let body = json!({ "error": format!("Invalid request body: {}", msg) });
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            RestApiError::Portal(err) => err,
        };

        let (status, body) = match (&err, err.kind()) {
            (PortalError::Validation(v), _) => {
                let mut body = json!({ "error": v.to_string() });
                if let Some(details) = validation_details(v) {
                    body["details"] = details;
                }
                (StatusCode::BAD_REQUEST, body)
            }
            (PortalError::Unauthenticated(msg), _) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            (_, ErrorKind::Authorization) => (StatusCode::FORBIDDEN, json!({ "error": err.to_string() })),
            (_, ErrorKind::Conflict) => (StatusCode::CONFLICT, json!({ "error": err.to_string() })),
            (PortalError::UpstreamUnavailable { operation, .. }, _) => {
                warn!("Upstream unavailable: {}", err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "error": format!("{} is temporarily unavailable. Please try again.", operation),
                        "details": { "operation": operation },
                        "retryable": true,
                    }),
                )
            }
            (PortalError::PartialBookingFailure { email, user_id, stage, .. }, _) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": format!("Your account was created but the booking could not be completed ({} step).", stage),
                    "details": { "email": email, "user_id": user_id, "stage": stage.to_string() },
                    "hint": "Submit the same booking again with the same email and password to finish it; your account is kept.",
                }),
            ),
            (PortalError::MetadataInsertFailed { record_url, .. }, _) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "The file was uploaded but the record could not be saved.",
                    "details": { "record_url": record_url },
                    "hint": "Retry the upload; the stored file can be reconciled using record_url.",
                }),
            ),
            _ => {
                error!("Internal error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An internal error occurred" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Shared state for the Axum application.
#[derive(Clone)]
pub struct AppState {
    pub services: ClinicServices,
    pub identity: Arc<dyn IdentityOracle>,
    pub roles: Arc<RolesConfig>,
    pub limits: CallLimits,
}

impl FromRef<AppState> for Arc<dyn IdentityOracle> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

impl AppState {
    pub fn new(deps: ClinicDeps) -> Self {
        AppState {
            identity: deps.identity.clone(),
            roles: deps.roles.clone(),
            limits: deps.limits,
            services: ClinicServices::new(deps),
        }
    }
}

type ApiResult<T> = Result<T, RestApiError>;

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub patient: Patient,
    pub appointment: Appointment,
}

impl From<BookingOutcome> for BookingResponse {
    fn from(outcome: BookingOutcome) -> Self {
        BookingResponse {
            patient: outcome.patient,
            appointment: outcome.appointment,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub tz: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordUploadRequest {
    pub patient_id: Uuid,
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub content_base64: String,
    pub record_type: String,
    #[serde(default)]
    pub doctor_name: Option<String>,
}

async fn health_check_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn list_doctors_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<Doctor>>> {
    Ok(Json(state.services.directory.list_doctors().await?))
}

async fn list_patients_handler(
    State(state): State<AppState>,
    SessionCaller(caller): SessionCaller,
) -> ApiResult<Json<Vec<Patient>>> {
    Ok(Json(state.services.directory.list_patients(&caller).await?))
}

async fn create_patient_handler(
    State(state): State<AppState>,
    SessionCaller(caller): SessionCaller,
    payload: Result<Json<NewPatient>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let Json(submitted) = payload?;
    let patient = state.services.directory.create_patient(&caller, submitted).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

async fn list_appointments_handler(
    State(state): State<AppState>,
    SessionCaller(caller): SessionCaller,
) -> ApiResult<Json<Vec<AppointmentView>>> {
    Ok(Json(state.services.access.visible_appointments(&caller).await?))
}

async fn create_appointment_handler(
    State(state): State<AppState>,
    SessionCaller(caller): SessionCaller,
    payload: Result<Json<AppointmentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    let Json(request) = payload?;
    let appointment = state.services.booking.book_for_patient(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn public_book_handler(
    State(state): State<AppState>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> ApiResult<Json<BookingResponse>> {
    let Json(request) = payload?;
    let outcome = state.services.booking.book(request).await?;
    Ok(Json(outcome.into()))
}

/// A `+` in a query string decodes to a space, so ` 05:30` means `+05:30`.
/// IANA names such as `America/New_York` are accepted as well.
fn query_zone(raw: &str) -> Result<Zone, ValidationError> {
    let normalized = match raw.strip_prefix(' ') {
        Some(rest) => format!("+{}", rest.trim()),
        None => raw.trim().to_string(),
    };
    Zone::parse(&normalized)
        .ok_or_else(|| ValidationError::invalid("tz", format!("'{}' is not a UTC offset or time zone name", raw)))
}

async fn dashboard_stats_handler(
    State(state): State<AppState>,
    SessionCaller(caller): SessionCaller,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<DashboardStats>> {
    state.roles.require(&caller, Permission::DashboardRead)?;
    let zone = match query.tz.as_deref().filter(|tz| !tz.trim().is_empty()) {
        Some(raw) => Some(query_zone(raw)?),
        None => None,
    };
    Ok(Json(state.services.dashboard.stats(zone).await?))
}

async fn portal_login(state: &AppState, login: UserLogin, portal: Portal) -> ApiResult<Json<Session>> {
    let session = state
        .limits
        .run("sign-in", login_for_portal(state.identity.as_ref(), login, portal))
        .await?;
    info!("{} signed in to the {:?} portal", session.email, portal);
    Ok(Json(session))
}

async fn doctor_login_handler(
    State(state): State<AppState>,
    payload: Result<Json<UserLogin>, JsonRejection>,
) -> ApiResult<Json<Session>> {
    let Json(login) = payload?;
    portal_login(&state, login, Portal::Doctor).await
}

async fn patient_login_handler(
    State(state): State<AppState>,
    payload: Result<Json<UserLogin>, JsonRejection>,
) -> ApiResult<Json<Session>> {
    let Json(login) = payload?;
    portal_login(&state, login, Portal::Patient).await
}

async fn list_records_handler(
    State(state): State<AppState>,
    SessionCaller(caller): SessionCaller,
) -> ApiResult<Json<Vec<MedicalRecord>>> {
    Ok(Json(state.services.access.visible_records(&caller).await?))
}

async fn upload_record_handler(
    State(state): State<AppState>,
    SessionCaller(caller): SessionCaller,
    payload: Result<Json<RecordUploadRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MedicalRecord>)> {
    let Json(body) = payload?;
    let bytes = BASE64
        .decode(body.content_base64.trim())
        .map_err(|e| ValidationError::invalid("content_base64", e.to_string()))?;
    let request = IngestRequest {
        patient_id: body.patient_id,
        upload: Upload {
            file_name: body.file_name,
            content_type: body.content_type,
            bytes,
        },
        record_type: body.record_type,
        doctor_name: body.doctor_name,
    };
    let record = state.services.ingestion.ingest(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .route("/api/doctors", get(list_doctors_handler))
        .route("/api/patients", get(list_patients_handler).post(create_patient_handler))
        .route(
            "/api/appointments",
            get(list_appointments_handler).post(create_appointment_handler),
        )
        .route("/api/public/book", post(public_book_handler))
        .route("/api/dashboard/stats", get(dashboard_stats_handler))
        .route("/api/auth/doctor/login", post(doctor_login_handler))
        .route("/api/auth/patient/login", post(patient_login_handler))
        .route("/api/records", get(list_records_handler).post(upload_record_handler))
        .with_state(state)
        .layer(cors)
}

/// Opens storage, loads roles and seeds configured doctors and staff logins.
pub async fn build_state(config: &PortalConfig) -> Result<AppState, AnyhowError> {
    let storage = create_storage(&config.storage).context("Failed to open directory storage")?;
    let accounts: Arc<dyn AccountStore> = match &storage.sled_db {
        Some(db) => Arc::new(SledAccountStore::new(db).context("Failed to open account storage")?),
        None => Arc::new(InMemoryAccountStore::default()),
    };

    if config.auth.uses_development_secret() {
        warn!("Using the built-in development JWT secret; set CLINIC__AUTH__JWT_SECRET in production");
    }
    let identity: Arc<dyn IdentityOracle> = Arc::new(LocalIdentityOracle::new(
        accounts,
        JwtConfig::new(&config.auth.jwt_secret, config.auth.session_ttl_secs),
    ));

    let roles = match &config.auth.roles_file {
        Some(path) => RolesConfig::from_yaml_file(path)?,
        None => RolesConfig::default(),
    };

    let state = AppState::new(ClinicDeps {
        store: storage.directory,
        identity,
        blobs: config.blob_store.build(),
        notifications: config.notifications.build(),
        roles: Arc::new(roles),
        limits: CallLimits::new(config.call_timeout()),
        server_zone: config.server_zone()?,
    });

    state
        .services
        .directory
        .seed_doctors(&config.doctors)
        .await
        .context("Failed to seed doctors")?;
    for staff in &config.staff {
        let registration = AccountRegistration {
            email: staff.email.clone(),
            password: staff.password.clone(),
            role: staff.role,
            name: staff.name.clone(),
        };
        match state.identity.create_account(registration).await {
            Ok(account) => info!("Created {} login for {}", account.role, account.email),
            Err(AuthError::AccountExists(email)) => debug!("Staff login {} already exists", email),
            Err(e) => return Err(anyhow::anyhow!("Failed to seed staff login {}: {}", staff.email, e)),
        }
    }
    Ok(state)
}

pub async fn start_server(config: PortalConfig, shutdown_rx: oneshot::Receiver<()>) -> Result<(), AnyhowError> {
    let state = build_state(&config).await?;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to address: {}", addr))?;
    info!("Clinic portal API listening on {}", addr);

    let shutdown_signal = async {
        tokio::select! {
            _ = shutdown_rx => info!("Received shutdown signal."),
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down."),
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("REST API server failed")?;
    Ok(())
}
