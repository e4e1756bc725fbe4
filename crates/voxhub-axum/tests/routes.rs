//! Router-level tests: health and device admission before the upgrade.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use voxhub_axum::{CorsConfig, HubContext, create_router};
use voxhub_core::{DeviceRecord, DeviceRepository, MemoryStore, StoreError, Stores};
use voxhub_voice::SessionConfig;

mockall::mock! {
    pub Devices {}

    #[async_trait]
    impl DeviceRepository for Devices {
        async fn validate_device(&self, mac_address: &str) -> Result<DeviceRecord, StoreError>;
        async fn set_presence(&self, device_id: &str, online: bool) -> Result<(), StoreError>;
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

const MAC: &str = "AA:BB:CC:DD:EE:FF";

fn router_with(stores: Stores) -> axum::Router {
    let ctx = HubContext::new(stores, common::providers(), SessionConfig::default());
    create_router(ctx, &CorsConfig::AllowAll)
}

async fn bound_store() -> Arc<MemoryStore> {
    let store = common::memory_store();
    store.bind_device(MAC).await;
    store
}

fn device_request(headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri("/xiaozhi/v1/");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn parse_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap_or_else(|e| panic!("Expected valid JSON body: {e}"))
}

// ── GET /health ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let app = router_with(Stores::shared(common::memory_store()));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}

// ── GET /xiaozhi/v1/ ──────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_device_id_is_rejected() {
    let app = router_with(Stores::shared(bound_store().await));
    let response = app
        .oneshot(device_request(&[("client-id", "c-1")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_json(response).await;
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn missing_client_id_is_rejected() {
    let app = router_with(Stores::shared(bound_store().await));
    let response = app
        .oneshot(device_request(&[("device-id", MAC)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_device_is_forbidden() {
    let app = router_with(Stores::shared(common::memory_store()));
    let response = app
        .oneshot(device_request(&[("device-id", MAC), ("client-id", "c-1")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unbound_device_is_forbidden() {
    let store = bound_store().await;
    store.unbind_device(MAC).await;
    let app = router_with(Stores::shared(store));
    let response = app
        .oneshot(device_request(&[("device-id", MAC), ("client-id", "c-1")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn store_failure_is_internal_error() {
    let mut devices = MockDevices::new();
    devices
        .expect_validate_device()
        .times(1)
        .returning(|_| Err(StoreError::Storage("connection refused".into())));

    let store = common::memory_store();
    let stores = Stores::new(Arc::new(devices), store.clone(), store.clone(), store);
    let app = router_with(stores);

    let response = app
        .oneshot(device_request(&[("device-id", MAC), ("client-id", "c-1")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn admitted_device_still_needs_an_upgrade() {
    let app = router_with(Stores::shared(bound_store().await));

    // Admission passes; a plain GET is not a WebSocket handshake.
    let response = app
        .clone()
        .oneshot(device_request(&[("device-id", MAC), ("client-id", "c-1")]))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), StatusCode::FORBIDDEN);

    // The alias answers the same way.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1")
                .header("device-id", MAC)
                .header("client-id", "c-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}
