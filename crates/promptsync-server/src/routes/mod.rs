pub mod mutations;
pub mod sync;

use axum::Router;

use crate::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new().merge(sync::routes()).merge(mutations::routes())
}
