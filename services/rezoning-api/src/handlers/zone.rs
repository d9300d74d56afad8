//! Zone scoring and weight schema.

use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use rezoning_common::{Geometry, LcoeError};
use rezoning_engine::{FilterSpec, LcoeParams, WeightSpec, ZoneRequest, ZoneScore};

use crate::error::ApiResult;
use crate::metrics::record_request;
use crate::state::AppState;

/// Body of a zone request. Filters come from the query string.
#[derive(Debug, Deserialize)]
pub struct ZoneBody {
    /// GeoJSON geometry, Feature or FeatureCollection.
    pub aoi: serde_json::Value,
    #[serde(default)]
    pub lcoe: LcoeParams,
    #[serde(default)]
    pub weights: serde_json::Map<String, serde_json::Value>,
}

/// POST /zone
pub async fn zone_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    zone_response(&state, None, &params, &body).await
}

/// POST /zone/:country_id
pub async fn country_zone_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(country): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    zone_response(&state, Some(country), &params, &body).await
}

/// GET /zone/schema
pub async fn weight_schema_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    Json(state.engine.weight_schema()).into_response()
}

async fn zone_response(
    state: &AppState,
    country: Option<String>,
    params: &[(String, String)],
    body: &[u8],
) -> Response {
    let start = Instant::now();
    let result = zone(state, country, params, body).await;
    record_request("zone", start.elapsed(), &result);

    match result {
        Ok(score) => Json(score).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn zone(
    state: &AppState,
    country: Option<String>,
    params: &[(String, String)],
    body: &[u8],
) -> ApiResult<ZoneScore> {
    let registry = state.engine.registry();
    let body: ZoneBody = serde_json::from_slice(body)
        .map_err(|e| LcoeError::invalid_parameter("body", e.to_string()))?;

    let request = ZoneRequest {
        aoi: Geometry::from_geojson_value(&body.aoi)?,
        country,
        lcoe: body.lcoe,
        weights: WeightSpec::from_json(&body.weights, registry)?,
        filters: FilterSpec::from_params(
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            registry,
        )?,
    };

    Ok(state.engine.zone(&request).await?)
}
