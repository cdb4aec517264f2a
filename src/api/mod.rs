//! API layer -- axum routes, handlers, and middleware.

pub mod error;
mod page;
mod routes;
pub mod state;

use self::state::AppState;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .route("/status", get(page::status_page))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}
