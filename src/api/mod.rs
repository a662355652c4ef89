//! QuizPulse REST API
//!
//! HTTP API layer for event collection and the analytics dashboard,
//! built with Axum.
//!
//! # Endpoints
//!
//! ## Ingest
//! - `POST /api/v1/events` - Single event
//! - `POST /api/v1/events/batch` - Batch of events
//!
//! ## Retrieval (shared secret required)
//! - `GET /api/v1/events` - Filtered raw events
//! - `GET /api/v1/dashboard` - Aggregated snapshot and advanced metrics
//! - `GET /api/v1/export` - Download events as csv, json or ndjson
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,no_run
//! use quizpulse::api::{serve, AppState};
//! use quizpulse::config::ApiConfig;
//! use quizpulse::store::{EventStore, MemoryBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(EventStore::new(Arc::new(MemoryBackend::new(Some(10_000)))));
//!     let config = ApiConfig {
//!         dashboard_secret: Some("change-me".to_string()),
//!         ..Default::default()
//!     };
//!
//!     serve(AppState::new(store, config.clone()), &config).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use auth::DashboardAccess;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let api_routes = Router::new()
        // Ingest and retrieval
        .route(
            "/events",
            post(routes::events::ingest_event).get(routes::events::list_events),
        )
        .route("/events/batch", post(routes::events::ingest_batch))
        // Aggregated views
        .route("/dashboard", get(routes::dashboard::get_dashboard))
        .route("/export", get(routes::export::export_events))
        // Batches of up to 10k events need more than the 2 MB default
        .layer(DefaultBodyLimit::max(16 * 1024 * 1024));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Permissive CORS unless specific origins are configured
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() || config.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    if config.dashboard_secret.is_none() {
        tracing::warn!("No dashboard secret configured; read endpoints will reject every request");
    }

    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("QuizPulse API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("QuizPulse API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
