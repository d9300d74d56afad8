//! Country boundaries and per-country layer statistics.
//!
//! Objects live under the countries prefix:
//! - `{id}.geojson`: boundary (geometry, Feature, or FeatureCollection)
//! - `{id}.minmax.json`: `{ "<layer>": { "min": .., "max": .. }, .. }`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

use rezoning_common::{Geometry, LcoeError, LcoeResult};

use crate::reader::{CacheWeight, SizedLruCache};
use crate::storage::ObjectStorage;

/// Statistics keys with these prefixes belong to the wind/solar atlas layer
/// family and are not served to generic clients.
pub const RESERVED_PREFIXES: [&str; 2] = ["gwa", "gsa"];

const BOUNDARY_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Min/max of one layer over a country.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerBounds {
    pub min: f64,
    pub max: f64,
}

impl CacheWeight for Geometry {
    fn weight(&self) -> usize {
        let positions: usize = self
            .polygons()
            .iter()
            .map(|p| p.exterior().len() + p.holes().iter().map(Vec::len).sum::<usize>())
            .sum();
        positions * std::mem::size_of::<(f64, f64)>()
    }
}

/// Drop keys under the reserved prefixes.
pub fn public_bounds(mut bounds: BTreeMap<String, LayerBounds>) -> BTreeMap<String, LayerBounds> {
    bounds.retain(|key, _| !RESERVED_PREFIXES.iter().any(|p| key.starts_with(p)));
    bounds
}

/// Country ids are storage key components: letters, digits, `-` and `_`.
pub fn validate_country_id(id: &str) -> LcoeResult<()> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LcoeError::invalid_parameter(
            "country_id",
            format!("'{}' is not a valid country id", id),
        ))
    }
}

/// Reads country boundaries and statistics from object storage.
pub struct CountryStore {
    storage: ObjectStorage,
    prefix: String,
    boundaries: Mutex<SizedLruCache<String, Arc<Geometry>>>,
}

impl CountryStore {
    pub fn new(storage: ObjectStorage, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into().trim_matches('/').to_string(),
            boundaries: Mutex::new(SizedLruCache::new(BOUNDARY_CACHE_BYTES)),
        }
    }

    fn key(&self, id: &str, suffix: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}.{}", id, suffix)
        } else {
            format!("{}/{}.{}", self.prefix, id, suffix)
        }
    }

    /// Boundary polygon of a country.
    #[instrument(skip(self))]
    pub async fn geometry(&self, id: &str) -> LcoeResult<Arc<Geometry>> {
        validate_country_id(id)?;
        let cached = self
            .boundaries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id.to_string());
        if let Some(geometry) = cached {
            return Ok(geometry);
        }

        let bytes = self
            .storage
            .get_opt(&self.key(id, "geojson"))
            .await?
            .ok_or_else(|| LcoeError::CountryNotFound(id.to_string()))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| LcoeError::Storage(format!("malformed boundary for {}: {}", id, e)))?;
        let geometry = Geometry::from_geojson_value(&value).map_err(|e| {
            LcoeError::Storage(format!("malformed boundary for {}: {}", id, e))
        })?;
        let geometry = Arc::new(geometry);
        debug!(country = %id, polygons = geometry.polygons().len(), "Loaded country boundary");

        self.boundaries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), geometry.clone());
        Ok(geometry)
    }

    /// Every layer statistic stored for a country, reserved keys included.
    pub async fn min_max(&self, id: &str) -> LcoeResult<BTreeMap<String, LayerBounds>> {
        validate_country_id(id)?;
        let bytes = self
            .storage
            .get_opt(&self.key(id, "minmax.json"))
            .await?
            .ok_or_else(|| LcoeError::CountryNotFound(id.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| LcoeError::Storage(format!("malformed statistics for {}: {}", id, e)))
    }

    /// Layer statistics served to clients.
    pub async fn layer_bounds(&self, id: &str) -> LcoeResult<BTreeMap<String, LayerBounds>> {
        self.min_max(id).await.map(public_bounds)
    }
}
