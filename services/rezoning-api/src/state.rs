//! Application state and shared resources.

use anyhow::{anyhow, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::env;
use std::sync::Arc;
use tracing::info;

use rezoning_engine::{
    CountryStore, DatasetReader, Engine, EngineConfig, LayerRegistry, ObjectStorage,
    RasterStoreReader, StorageConfig,
};

/// Shared application state.
pub struct AppState {
    pub engine: Engine,
    pub storage: ObjectStorage,
    /// Prefix probed by the readiness check.
    pub datasets_prefix: String,
    /// Storage-backed reader, kept for cache statistics.
    pub raster_reader: Option<Arc<RasterStoreReader>>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(engine: Engine, storage: ObjectStorage, datasets_prefix: impl Into<String>) -> Self {
        Self {
            engine,
            storage,
            datasets_prefix: datasets_prefix.into(),
            raster_reader: None,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Build the state from environment variables.
    pub fn from_env() -> Result<Self> {
        let config = EngineConfig::from_env();
        config
            .validate()
            .map_err(|e| anyhow!("invalid engine configuration: {}", e))?;
        let storage_config = StorageConfig::from_env();

        let registry = match env::var("LAYER_REGISTRY_PATH") {
            Ok(path) => {
                info!(path = %path, "Loading layer registry from file");
                LayerRegistry::from_yaml_file(&path)?
            }
            Err(_) => LayerRegistry::builtin()?,
        };
        info!(
            datasets = registry.datasets().len(),
            layers = registry.layers().len(),
            filters = registry.filters().len(),
            "Layer registry loaded"
        );

        let storage = ObjectStorage::new(&storage_config)?;
        let reader = Arc::new(RasterStoreReader::new(
            storage.clone(),
            storage_config.datasets_prefix.clone(),
            &config,
        ));
        let countries = Arc::new(CountryStore::new(
            storage.clone(),
            storage_config.countries_prefix.clone(),
        ));

        info!(
            data_url = %storage_config.data_url,
            tile_size = config.tile_size,
            normalization = config.normalization.as_str(),
            resampling = config.resampling.as_str(),
            "Engine configured"
        );

        let engine = Engine::new(
            Arc::new(registry),
            reader.clone() as Arc<dyn DatasetReader>,
            countries,
            config,
        );

        let mut state = Self::new(engine, storage, storage_config.datasets_prefix);
        state.raster_reader = Some(reader);
        Ok(state)
    }
}
