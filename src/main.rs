use axum::http::{header, HeaderName, Method};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{self, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use staging_gateway::backend::GenerationClient;
use staging_gateway::config::Config;
use staging_gateway::key_client::KeyManagerClient;
use staging_gateway::middleware::gate::API_KEY_HEADER;
use staging_gateway::{build_app, AppState};

/// Browser origins may send the API key themselves, so the key header is
/// allowed alongside the form's content type.
fn build_cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([Method::GET, Method::POST]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ]))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let validator = KeyManagerClient::new(&config.key_manager_url, config.key_manager_timeout)
        .expect("Failed to build key manager client");
    let backend = GenerationClient::new(config.backend_url.clone(), config.backend_timeout)
        .expect("Failed to build generation backend client");

    tracing::info!(
        key_manager = %config.key_manager_url,
        backend = %config.backend_url,
        protected = ?config.protected_prefixes,
        "Upstreams configured"
    );

    let cors = build_cors(&config.cors_origins);

    let state = AppState {
        validator: Arc::new(validator),
        backend,
        protected_prefixes: config.protected_prefixes.clone().into(),
        max_payload_bytes: config.max_payload_bytes,
    };

    let app = build_app(state)
        .layer(RequestBodyLimitLayer::new(config.max_payload_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_request(trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    trace::DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Millis),
                )
                .on_failure(
                    trace::DefaultOnFailure::new()
                        .level(Level::ERROR)
                        .latency_unit(tower_http::LatencyUnit::Millis),
                ),
        )
        .layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Resolve on Ctrl+C, or on SIGTERM where the platform has it. In-flight
/// forwards to the backend are allowed to finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "ctrl_c", "Shutting down gateway"),
        _ = terminate => tracing::info!(signal = "sigterm", "Shutting down gateway"),
    }
}
