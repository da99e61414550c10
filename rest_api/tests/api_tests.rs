// rest_api/tests/api_tests.rs
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use lib::{CallLimits, ClinicDeps, DirectoryStore, InMemoryBlobStore, InMemoryStorage, LogNotificationSink};
use models::medical::{Doctor, Role};
use models::timestamps::Zone;
use rest_api::{AppState, build_router};
use security::{AccountRegistration, IdentityOracle, InMemoryAccountStore, JwtConfig, LocalIdentityOracle, RolesConfig};

struct TestApp {
    router: Router,
    store: Arc<InMemoryStorage>,
    identity: Arc<LocalIdentityOracle>,
    doctor: Doctor,
}

async fn test_app() -> TestApp {
    let store = Arc::new(InMemoryStorage::new());
    let doctor = store
        .insert_doctor(Doctor::new("Dr. Sarah Wilson", "Cardiology", "sarah@clinic.test"))
        .await
        .unwrap();
    let identity = Arc::new(LocalIdentityOracle::new(
        Arc::new(InMemoryAccountStore::default()),
        JwtConfig::new("api-tests-secret-0123456789abcdef", 3600),
    ));
    for (email, role, name) in [
        ("sarah@clinic.test", Role::Doctor, "Sarah Wilson"),
        ("admin@clinic.test", Role::Admin, "Clinic Admin"),
    ] {
        identity
            .create_account(AccountRegistration {
                email: email.to_string(),
                password: "staffpass".to_string(),
                role,
                name: name.to_string(),
            })
            .await
            .unwrap();
    }
    let state = AppState::new(ClinicDeps {
        store: store.clone(),
        identity: identity.clone(),
        blobs: Arc::new(InMemoryBlobStore::new("https://blobs.test/records")),
        notifications: Arc::new(LogNotificationSink),
        roles: Arc::new(RolesConfig::default()),
        limits: CallLimits::default(),
        server_zone: Zone::utc(),
    });
    TestApp {
        router: build_router(state),
        store,
        identity,
        doctor,
    }
}

async fn send(router: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login(router: &Router, portal: &str, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        router,
        "POST",
        &format!("/api/auth/{}/login", portal),
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await
}

async fn token(router: &Router, portal: &str, email: &str, password: &str) -> String {
    let (status, body) = login(router, portal, email, password).await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

fn booking(doctor_id: &str, password: &str, confirm: &str) -> Value {
    json!({
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "contact_number": "555-0100",
        "age": "36",
        "condition": "Palpitations",
        "doctor_id": doctor_id,
        "appointment_date": "2026-03-02T09:30",
        "reason": "Chest pain",
        "password": password,
        "confirmPassword": confirm,
    })
}

#[tokio::test]
async fn health_reports_version() {
    let app = test_app().await;
    let (status, body) = send(&app.router, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn public_booking_then_patient_portal() {
    let app = test_app().await;
    let doctor_id = app.doctor.id.to_string();

    let (status, body) = send(&app.router, "POST", "/api/public/book", None, Some(booking(&doctor_id, "secret1", "secret1"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["patient"]["email"], "ada@example.com");
    assert_eq!(body["appointment"]["doctor_name"], "Dr. Sarah Wilson");
    assert_eq!(body["appointment"]["patient_id"], body["patient"]["id"]);

    let (status, body) = send(&app.router, "POST", "/api/public/book", None, Some(booking(&doctor_id, "secret1", "secret1"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already exists"));
    assert_eq!(app.store.count_patients().await.unwrap(), 1);

    let patient_token = token(&app.router, "patient", "ada@example.com", "secret1").await;
    let (status, body) = send(&app.router, "GET", "/api/appointments", Some(&patient_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["patient_name"], "Ada Lovelace");

    let (status, body) = login(&app.router, "doctor", "ada@example.com", "secret1").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Access denied. This portal is for doctors only.");
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn weak_password_is_rejected_without_writes() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/public/book",
        None,
        Some(booking(&app.doctor.id.to_string(), "abc", "abc")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Password must be at least 6 characters long");
    assert!(app.identity.find_account("ada@example.com").await.unwrap().is_none());
    assert_eq!(app.store.count_patients().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_doctor_reports_details() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/public/book",
        None,
        Some(booking("00000000-0000-0000-0000-000000000000", "secret1", "secret1")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["doctor_id"], "00000000-0000-0000-0000-000000000000");
}

#[tokio::test]
async fn staff_screens_require_a_session() {
    let app = test_app().await;
    let (status, _) = send(&app.router, "GET", "/api/patients", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app.router, "GET", "/api/patients", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app.router, "GET", "/api/appointments", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = send(&app.router, "GET", "/api/doctors", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Dr. Sarah Wilson");
}

#[tokio::test]
async fn staff_register_patient_book_and_upload() {
    let app = test_app().await;
    let admin = token(&app.router, "doctor", "admin@clinic.test", "staffpass").await;

    let (status, patient) = send(
        &app.router,
        "POST",
        "/api/patients",
        Some(&admin),
        Some(json!({
            "name": "Grace Hopper",
            "age": 85,
            "condition": "Hypertension",
            "status": "Admitted",
            "contact_number": "555-0102",
            "email": "Grace@X.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{patient}");
    assert_eq!(patient["email"], "grace@x.com");
    let patient_id = patient["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/patients",
        Some(&admin),
        Some(json!({
            "name": "Grace Again",
            "age": 85,
            "condition": "Hypertension",
            "contact_number": "555-0102",
            "email": "grace@x.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, appointment) = send(
        &app.router,
        "POST",
        "/api/appointments",
        Some(&admin),
        Some(json!({
            "patient_id": patient_id,
            "doctor_name": "Dr. Sarah Wilson",
            "appointment_date": "2026-03-02T10:00:00Z",
            "reason": "Review",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{appointment}");
    assert_eq!(appointment["doctor_specialty"], "Cardiology");

    let doctor = token(&app.router, "doctor", "sarah@clinic.test", "staffpass").await;
    let (status, visible) = send(&app.router, "GET", "/api/appointments", Some(&doctor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(visible.as_array().unwrap().len(), 1);
    assert_eq!(visible[0]["patient_name"], "Grace Hopper");

    let (status, record) = send(
        &app.router,
        "POST",
        "/api/records",
        Some(&doctor),
        Some(json!({
            "patient_id": patient_id,
            "file_name": "ecg.png",
            "content_type": "image/png",
            "content_base64": BASE64.encode(b"\x89PNG"),
            "record_type": "ECG",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{record}");
    assert_eq!(record["doctor_name"], "Dr. Sarah Wilson");
    assert!(record["record_url"].as_str().unwrap().starts_with("https://blobs.test/records/"));
    assert!(record["record_url"].as_str().unwrap().ends_with(".png"));

    let (status, records) = send(&app.router, "GET", "/api/records", Some(&doctor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records, json!([]));
}

#[tokio::test]
async fn dashboard_requires_staff_and_accepts_offset() {
    let app = test_app().await;
    let doctor = token(&app.router, "doctor", "sarah@clinic.test", "staffpass").await;

    let (status, body) = send(&app.router, "GET", "/api/dashboard/stats?tz=%2B05:30", Some(&doctor), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body,
        json!({ "totalPatients": 0, "appointmentsToday": 0, "totalAppointments": 0, "totalDoctors": 1 })
    );

    let (status, _) = send(&app.router, "GET", "/api/dashboard/stats?tz=+05:30", Some(&doctor), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, "GET", "/api/dashboard/stats?tz=America%2FNew_York", Some(&doctor), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, "GET", "/api/dashboard/stats?tz=mars", Some(&doctor), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["field"], "tz");

    let (status, _) = send(&app.router, "GET", "/api/dashboard/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/public/book")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
