use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::app_state::AppState;

use super::handlers;

pub fn build_router(state: Arc<AppState>) -> Router {
    let scanner_routes = Router::new()
        .route("/scanner/start", post(handlers::scanner_start))
        .route("/scanner/stop", post(handlers::scanner_stop))
        .route("/scanner/focus", post(handlers::scanner_focus))
        .route("/decode", post(handlers::decode))
        .route("/confirm", post(handlers::confirm))
        .route("/cancel", post(handlers::cancel));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/cameras", get(handlers::cameras))
        .route("/ping", get(handlers::ping))
        .merge(scanner_routes)
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}
