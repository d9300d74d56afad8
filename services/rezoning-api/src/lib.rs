//! Rezoning API service library.
//!
//! Exposes the router so tests can drive it without a listener.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod state;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Filter tiles, filter schema, country layer bounds
        .route("/filter/*path", get(handlers::filter_handler))
        // Zone scoring
        .route("/zone", post(handlers::zone_handler))
        .route("/zone/", post(handlers::zone_handler))
        .route("/zone/schema", get(handlers::weight_schema_handler))
        .route("/zone/:country_id", post(handlers::country_zone_handler))
        // Health check
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::ready_handler))
        // Metrics
        .route("/metrics", get(handlers::metrics_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
