//! Filter tiles, filter schema and country layer bounds.
//!
//! Every `/filter/...` path goes through [`filter_handler`]:
//!
//! ```text
//! /filter/schema                       filter schema
//! /filter/{country}/layers             country layer bounds
//! /filter/{z}/{x}/{y}[.png]            filter tile
//! /filter/{country}/{z}/{x}/{y}[.png]  filter tile masked by country
//! ```

use axum::{
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

use rezoning_common::TileCoord;
use rezoning_engine::FilterSpec;
use tile_renderer::{render_tile, Rgba};

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_request;
use crate::state::AppState;

/// GET /filter/*path
pub async fn filter_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["schema"] => Json(state.engine.filter_schema()).into_response(),
        [country, "layers"] => match state.engine.country_bounds(country).await {
            Ok(bounds) => Json(bounds).into_response(),
            Err(e) => ApiError::from(e).into_response(),
        },
        [z, x, y] => tile_response(&state, None, z, x, y, &params).await,
        [country, z, x, y] => tile_response(&state, Some(country), z, x, y, &params).await,
        _ => ApiError::NotFound(format!("/filter/{}", path)).into_response(),
    }
}

async fn tile_response(
    state: &AppState,
    country: Option<&str>,
    z: &str,
    x: &str,
    y: &str,
    params: &[(String, String)],
) -> Response {
    let start = Instant::now();
    let result = filter_tile(state, country, z, x, y, params).await;
    record_request("filter", start.elapsed(), &result);

    match result {
        Ok(png) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::CACHE_CONTROL, "public, max-age=3600"),
            ],
            png,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

#[instrument(skip(state, params), fields(country = ?country))]
async fn filter_tile(
    state: &AppState,
    country: Option<&str>,
    z: &str,
    x: &str,
    y: &str,
    params: &[(String, String)],
) -> ApiResult<Vec<u8>> {
    let tile = TileCoord::parse(z, x, y)?;
    let color = match params.iter().find(|(k, _)| k == "color") {
        Some((_, value)) => Rgba::parse(value)?,
        None => Rgba::default(),
    };
    let filters = FilterSpec::from_params(
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        state.engine.registry(),
    )?;

    let result = state.engine.filter_tile(tile, country, &filters).await?;
    let size = state.engine.config().tile_size;
    let png = render_tile(&result.tile, &result.mask, color, size, size)?;

    debug!(
        included = result.included(),
        bytes = png.len(),
        "Rendered filter tile"
    );
    Ok(png)
}
