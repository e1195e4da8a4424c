//! Shared application state, following `backend-api::state::AppState`'s
//! shape: one `Arc`-wrapped handle cloned into every request.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::dataset::ServerDataset;

#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<Mutex<ServerDataset>>,
}

impl AppState {
    pub fn new() -> Self {
        Self { dataset: Arc::new(Mutex::new(ServerDataset::new())) }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
