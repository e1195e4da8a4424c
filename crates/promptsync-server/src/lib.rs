//! Mock remote authority server for the prompt catalog sync protocol.
//! No auth, no persistence beyond process memory, no seed data — a peer
//! for local dev and integration tests, not a production backend.

pub mod dataset;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Builds the router against a caller-supplied state, for tests that want
/// to seed the dataset or inspect it after driving requests through.
pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(routes::api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Builds the router with a fresh, empty dataset.
pub fn app() -> Router {
    app_with_state(AppState::new())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
