//! `POST /api/mutations`.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use promptsync_core::sync::types::{MutationsRequest, MutationsResponse};
use tracing::debug;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/mutations", post(handle_mutations))
}

async fn handle_mutations(State(state): State<AppState>, Json(req): Json<MutationsRequest>) -> Json<MutationsResponse> {
    let mut dataset = state.dataset.lock();
    let results: Vec<_> = req.mutations.iter().map(|m| dataset.apply_mutation(m)).collect();
    let success = results.iter().all(|r| r.success);
    let sync_id = dataset.latest_seq();
    debug!(client_id = %req.client_id, count = results.len(), success, "applied mutation batch");

    Json(MutationsResponse { success, sync_id, results, conflicts: None })
}
