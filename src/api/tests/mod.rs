use super::*;
use crate::reports::test_helpers::{MockMintingApi, create_test_service_with, drain};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

mod reports;

/// Service over a 23-transaction project plus the router in front of it
async fn create_test_app(
    tweak: impl FnOnce(&mut Config),
) -> (Arc<ReportService>, Router, tempfile::TempDir) {
    let (service, temp_dir) =
        create_test_service_with(MockMintingApi::with_project(23, 1), tweak).await;
    let service = Arc::new(service);
    let router = create_router(service.clone(), service.get_config());
    (service, router, temp_dir)
}

async fn send(router: &Router, method: Method, uri: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns_and_stops_on_shutdown() {
    let (service, _router, _temp_dir) = create_test_app(|_| {}).await;

    let mut config = (*service.get_config()).clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let server = tokio::spawn(start_api_server(service.clone(), Arc::new(config)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    service.shutdown().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let (_service, router, _temp_dir) = create_test_app(|_| {}).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_cors_restricted_to_listed_origins() {
    let (_service, router, _temp_dir) = create_test_app(|config| {
        config.server.api.cors_origins = vec!["https://ops.example.com".to_string()];
    })
    .await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "https://elsewhere.example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[tokio::test]
async fn test_api_key_guards_every_route() {
    let (_service, router, _temp_dir) = create_test_app(|config| {
        config.server.api.api_key = Some("s3cret".to_string());
    })
    .await;

    let response = send(&router, Method::POST, "/generate-report").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/generate-report")
        .header("X-Api-Key", "s3cret")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_swagger_ui_can_be_disabled() {
    let (_service, router, _temp_dir) = create_test_app(|config| {
        config.server.api.swagger_ui = false;
    })
    .await;

    let response = send(&router, Method::GET, "/swagger-ui/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
