//! `POST /api/sync`.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use promptsync_core::entity::now_iso8601;
use promptsync_core::sync::types::{SyncRequest, SyncResponse};
use tracing::debug;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/sync", post(handle_sync))
}

async fn handle_sync(State(state): State<AppState>, Json(req): Json<SyncRequest>) -> Json<SyncResponse> {
    // limit=0 means "use the default", not "return nothing" — absence and
    // an explicit 0 are the same request.
    let limit = req.limit.filter(|&l| l != 0).unwrap_or(100);
    let dataset = state.dataset.lock();
    let (changes, has_more, sync_id) = dataset.changes_since(req.last_sync_id, limit);
    debug!(last_sync_id = req.last_sync_id, sync_id, has_more, "served pull");

    Json(SyncResponse { sync_id, timestamp: now_iso8601(), has_more, changes })
}
