use actix_web::http::StatusCode;
use serde_json::Value;

use super::{
    helpers::{operator_request, Method, TEST_ADMIN_TOKEN},
    mocks::MockMonitor,
};

#[actix_web::test]
async fn status_requires_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        operator_request(Method::Get, "/api/monitor/status", None, TEST_ADMIN_TOKEN, MockMonitor::default()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"A valid admin token is required for this request."}"#);

    let (status, _) =
        operator_request(Method::Get, "/api/monitor/status", Some("wrong"), TEST_ADMIN_TOKEN, MockMonitor::default())
            .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn routes_are_disabled_without_a_configured_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        operator_request(Method::Post, "/api/monitor/resume", Some(""), "", MockMonitor::default()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("LPG_ADMIN_TOKEN"));
}

#[actix_web::test]
async fn healthy_status() {
    let _ = env_logger::try_init().ok();
    let monitor = MockMonitor::default();
    let (status, body) =
        operator_request(Method::Get, "/api/monitor/status", Some(TEST_ADMIN_TOKEN), TEST_ADMIN_TOKEN, monitor).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["running"], true);
    assert_eq!(json["consecutive_failures"], 0);
    assert_eq!(json["failure_threshold"], 5);
    assert_eq!(json["pool"]["worker_count"], 5);
    assert!(json["last_cycle"].is_null());
}

#[actix_web::test]
async fn paused_status_and_manual_resume() {
    let _ = env_logger::try_init().ok();
    let monitor = MockMonitor::default();
    for _ in 0..5 {
        monitor.tracker.record_failure("ledger unreachable");
    }
    let (status, body) = operator_request(
        Method::Get,
        "/api/monitor/status",
        Some(TEST_ADMIN_TOKEN),
        TEST_ADMIN_TOKEN,
        monitor.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "paused");
    assert_eq!(json["consecutive_failures"], 5);
    assert_eq!(json["last_error"], "ledger unreachable");

    let (status, body) = operator_request(
        Method::Post,
        "/api/monitor/resume",
        Some(TEST_ADMIN_TOKEN),
        TEST_ADMIN_TOKEN,
        monitor.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["consecutive_failures"], 0);
    assert_eq!(monitor.resume_count(), 1);
    assert!(!monitor.tracker.is_paused());
}

#[actix_web::test]
async fn resume_is_post_only() {
    let _ = env_logger::try_init().ok();
    let monitor = MockMonitor::default();
    let (status, _) = operator_request(
        Method::Get,
        "/api/monitor/resume",
        Some(TEST_ADMIN_TOKEN),
        TEST_ADMIN_TOKEN,
        monitor.clone(),
    )
    .await;
    assert!(status.is_client_error());
    assert_eq!(monitor.resume_count(), 0);
}
