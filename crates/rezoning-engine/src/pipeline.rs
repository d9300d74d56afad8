//! Request pipeline: resolve, read, align, evaluate, score.
//!
//! ```text
//! filter tile:  FilterSpec ─► ResolvedLayers ─► read (buffered) ─► AlignedArray ─► FilterResult
//! zone:         + WeightSpec + LcoeParams ─────────────────────────► LcoePlanes ─► ZoneScore
//! ```

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use rezoning_common::{Geometry, LcoeError, LcoeResult, TileCoord};

use crate::config::EngineConfig;
use crate::countries::{CountryStore, LayerBounds};
use crate::evaluator::{evaluate, FilterResult};
use crate::lcoe::{LcoeParams, LcoePlanes};
use crate::params::{FilterSpec, WeightSpec};
use crate::reader::DatasetReader;
use crate::registry::{CriterionSource, LayerRegistry};
use crate::resolver::ResolvedLayers;
use crate::schema::{filter_schema, weight_schema, FilterSchemaEntry, WeightSchemaEntry};
use crate::score::{score, ScoreInputs, ScoreSettings, WeightedPlane};
use crate::types::{AlignedArray, Region, ZoneScore};

/// A scoring request over an explicit area of interest.
#[derive(Debug, Clone)]
pub struct ZoneRequest {
    pub aoi: Geometry,
    /// Country whose boundary additionally masks the area.
    pub country: Option<String>,
    pub lcoe: LcoeParams,
    pub weights: WeightSpec,
    pub filters: FilterSpec,
}

/// Shared, read-only request engine.
pub struct Engine {
    registry: Arc<LayerRegistry>,
    reader: Arc<dyn DatasetReader>,
    countries: Arc<CountryStore>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        registry: Arc<LayerRegistry>,
        reader: Arc<dyn DatasetReader>,
        countries: Arc<CountryStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            reader,
            countries,
            config,
        }
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn countries(&self) -> &CountryStore {
        &self.countries
    }

    /// Read every resolved dataset over `region` and stack the planes in the
    /// resolver's dataset order. Reads run concurrently; `buffered` yields in
    /// submission order, so completion order never reaches the layer axis.
    /// The first failed read fails the request.
    pub async fn read_aligned(
        &self,
        resolved: &ResolvedLayers,
        region: &Region,
    ) -> LcoeResult<AlignedArray> {
        let reader = self.reader.as_ref();
        let arrays = stream::iter(
            resolved
                .datasets
                .iter()
                .map(|dataset| reader.read(dataset, region))
                .collect::<Vec<_>>(),
        )
        .buffered(self.config.max_concurrent_reads.max(1))
        .try_collect::<Vec<_>>()
        .await?;

        for (dataset, array) in resolved.datasets.iter().zip(&arrays) {
            if array.layers != dataset.layers {
                return Err(LcoeError::dataset_read(
                    &dataset.id,
                    format!(
                        "reader returned layers {:?}, expected {:?}",
                        array.layers, dataset.layers
                    ),
                ));
            }
        }
        AlignedArray::concat(region, arrays)
    }

    /// Evaluate a filter tile, optionally masked by a country boundary.
    ///
    /// A country-masked tile that does not touch the country's bounding box
    /// is all-excluded; with `skip_tiles_outside_country` it is returned
    /// without reading any dataset.
    #[instrument(skip(self, filters), fields(z = tile.z, x = tile.x, y = tile.y))]
    pub async fn filter_tile(
        &self,
        tile: TileCoord,
        country: Option<&str>,
        filters: &FilterSpec,
    ) -> LcoeResult<FilterResult> {
        let size = self.config.tile_size;
        let exclusion = match country {
            Some(id) => Some(self.countries.geometry(id).await?),
            None => None,
        };

        if let Some(boundary) = &exclusion {
            if self.config.skip_tiles_outside_country && !boundary.bbox().intersects(&tile.bounds()) {
                debug!(country = ?country, "Tile outside country bounds, skipping reads");
                return Ok(FilterResult::empty(size * size));
            }
        }

        let region = Region::tile(tile, size, exclusion.map(|g| g.as_ref().clone()))?;
        let resolved = ResolvedLayers::for_filters(&self.registry, filters);
        debug!(datasets = ?resolved.dataset_ids().collect::<Vec<_>>(), "Resolved filter datasets");

        let array = self.read_aligned(&resolved, &region).await?;
        evaluate(&array, filters, &self.registry)
    }

    /// Score an area of interest.
    #[instrument(skip(self, request), fields(country = ?request.country))]
    pub async fn zone(&self, request: &ZoneRequest) -> LcoeResult<ZoneScore> {
        let start = Instant::now();
        request.lcoe.validate()?;
        let cf_layer = request.lcoe.capacity_factor_layer(&self.registry)?;

        let exclusion = match &request.country {
            Some(id) => Some(self.countries.geometry(id).await?.as_ref().clone()),
            None => None,
        };
        let region = Region::polygon(request.aoi.clone(), self.config.region_max_size, exclusion)?;

        let resolved = ResolvedLayers::for_scoring(
            &self.registry,
            &request.filters,
            &request.weights,
            cf_layer,
        );
        let array = self.read_aligned(&resolved, &region).await?;
        let filtered = evaluate(&array, &request.filters, &self.registry)?;

        let lcoe_layers = self.registry.lcoe_layers();
        let cf = required_plane(&array, cf_layer)?;
        let grid = required_plane(&array, &lcoe_layers.transmission_distance)?;
        let roads = required_plane(&array, &lcoe_layers.road_distance)?;
        let lcoe = LcoePlanes::compute(&request.lcoe, cf, grid, roads);

        let mut criteria = Vec::new();
        for (key, weight) in request.weights.nonzero() {
            let Some(criterion) = self.registry.criterion(key) else {
                continue;
            };
            let weighted = match &criterion.source {
                CriterionSource::Layer(layer) => WeightedPlane {
                    weight,
                    plane: required_plane(&array, layer)?,
                    domain: self.registry.layer(layer).map(|l| l.domain),
                },
                CriterionSource::Lcoe(component) => WeightedPlane {
                    weight,
                    plane: lcoe.component(*component),
                    domain: None,
                },
            };
            criteria.push(weighted);
        }

        let inputs = ScoreInputs {
            criteria,
            lcoe: &lcoe.total,
            capacity_factor: cf,
        };
        let result = score(&inputs, &filtered.mask, &ScoreSettings::from(&self.config));

        info!(
            pixels = filtered.mask.len(),
            included = filtered.included(),
            layers = array.layer_count(),
            zone_score = result.zone_score,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Zone scored"
        );
        Ok(result)
    }

    /// Per-layer min/max of a country, without the atlas layer families.
    pub async fn country_bounds(&self, country: &str) -> LcoeResult<BTreeMap<String, LayerBounds>> {
        self.countries.layer_bounds(country).await
    }

    pub fn filter_schema(&self) -> BTreeMap<String, FilterSchemaEntry> {
        filter_schema(&self.registry)
    }

    pub fn weight_schema(&self) -> BTreeMap<String, WeightSchemaEntry> {
        weight_schema(&self.registry)
    }
}

fn required_plane<'a>(array: &'a AlignedArray, layer: &str) -> LcoeResult<&'a [f32]> {
    array
        .plane(layer)
        .ok_or_else(|| LcoeError::Internal(format!("layer '{}' was not read", layer)))
}
