pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod key_client;
pub mod middleware;
pub mod models;
pub mod util;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use backend::GenerationClient;
use key_client::KeyValidator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<dyn KeyValidator>,
    pub backend: GenerationClient,
    pub protected_prefixes: Arc<[String]>,
    pub max_payload_bytes: usize,
}

fn generation_routes() -> Router<AppState> {
    Router::new().route("/api/generate", post(handlers::generate::generate))
}

fn key_routes() -> Router<AppState> {
    Router::new().route("/api/key-status", post(handlers::key_status::key_status))
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health_check))
}

/// Build the full application router (used by main and tests).
///
/// The API key gate wraps every route and decides by path prefix whether
/// a request needs a key.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(generation_routes())
        .merge(key_routes())
        .merge(health_routes())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::gate::require_api_key,
        ))
        .layer(DefaultBodyLimit::max(state.max_payload_bytes))
        .with_state(state)
}
