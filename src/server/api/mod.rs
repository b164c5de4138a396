pub mod auth;
pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::server::AppState;
use handlers::ApiDoc;

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/readings/batch", post(handlers::ingest_readings))
        .route(
            "/api/v1/items",
            get(handlers::list_items).post(handlers::create_item),
        )
        .route(
            "/api/v1/items/{item_id}",
            get(handlers::get_item).put(handlers::update_item),
        )
        .route(
            "/api/v1/items/{item_id}/thresholds",
            post(handlers::update_thresholds),
        )
        .route("/api/v1/items/{item_id}/history", get(handlers::item_history))
        .route("/api/v1/alerts", get(handlers::list_alerts))
        .route("/api/v1/alerts/{alert_id}/ack", post(handlers::ack_alert))
        .route("/api/v1/devices", get(handlers::list_devices))
        .route("/api/v1/sensors", get(handlers::list_sensors))
        .route("/api/v1/stream", get(handlers::stream))
        .with_state(state)
        .split_for_parts();

    router.route(
        "/api-docs/openapi.json",
        get(move || async move { axum::Json(api) }),
    )
}
