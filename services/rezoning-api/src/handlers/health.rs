//! Health, readiness and metrics handlers.

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::record_cache_stats;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub datasets: usize,
    pub storage: String,
}

/// GET /health - Liveness
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready - Registry loaded and storage reachable
pub async fn ready_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let storage = match state.storage.ping(&state.datasets_prefix).await {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };
    let datasets = state.engine.registry().datasets().len();
    let ready = storage == "ok" && datasets > 0;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            ready,
            datasets,
            storage,
        }),
    )
        .into_response()
}

/// GET /metrics - Prometheus text format
pub async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    if let Some(reader) = &state.raster_reader {
        let (files, chunks) = reader.cache_stats();
        record_cache_stats("files", &files);
        record_cache_stats("chunks", &chunks);
    }

    let body = state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
