pub mod bind;
pub mod response;
pub mod stream;
pub mod test_endpoint;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn build_router(state: AppState, bind_path: &str, test_path: &str) -> Router {
    Router::new()
        .route(
            &format!("/{bind_path}"),
            get(bind::bind_handler).post(bind::bind_handler),
        )
        .route(&format!("/{test_path}"), get(test_endpoint::test_handler))
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}
