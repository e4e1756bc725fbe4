//! Route definitions and router construction.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bootstrap::{CorsConfig, HubContext};
use crate::handlers;
use crate::state::AppState;

/// Build CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    match config {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowOrigins(origins) => {
            use axum::http::HeaderValue;
            let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// Device endpoints. Firmware variants dial with and without the trailing
/// slash, so both forms are routed.
fn device_routes() -> Router<AppState> {
    Router::new()
        .route("/xiaozhi/v1/", get(handlers::device_ws::device_ws))
        .route("/xiaozhi/v1", get(handlers::device_ws::device_ws))
        .route("/api/v1", get(handlers::device_ws::device_ws))
        .route("/api/v1/", get(handlers::device_ws::device_ws))
}

/// Create the hub router.
pub fn create_router(ctx: HubContext, cors_config: &CorsConfig) -> Router {
    let state: AppState = Arc::new(ctx);

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(device_routes())
        .layer(build_cors_layer(cors_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
