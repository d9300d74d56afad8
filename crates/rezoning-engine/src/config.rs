//! Configuration for the engine and its storage backend.

use serde::{Deserialize, Serialize};

use crate::reader::ResamplingMethod;
use crate::score::NormalizationPolicy;

/// Tunables of the filter/score pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Output size of a filter tile in pixels (square).
    pub tile_size: usize,

    /// Longer side, in pixels, of the grid used for explicit polygons.
    pub region_max_size: usize,

    /// Side length used to normalize zone output into a density.
    pub tile_side_length: f64,

    /// Zone score returned when the mean composite is undefined.
    pub score_sentinel: f64,

    /// Normalization applied to each weighted criterion plane.
    pub normalization: NormalizationPolicy,

    /// Resampling used to align source rasters to the output grid.
    pub resampling: ResamplingMethod,

    /// Maximum dataset reads in flight for a single request.
    pub max_concurrent_reads: usize,

    /// Memory budget for source files held in memory, in megabytes (0 disables).
    pub source_cache_size_mb: usize,

    /// Memory budget for decoded raster chunks in megabytes (0 disables).
    pub chunk_cache_size_mb: usize,

    /// Return an empty tile without reading data when a country-masked tile
    /// does not touch the country's bounding box.
    pub skip_tiles_outside_country: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            region_max_size: 512,
            tile_side_length: 500.0,
            score_sentinel: 0.01,
            normalization: NormalizationPolicy::MinMax,
            resampling: ResamplingMethod::Nearest,
            max_concurrent_reads: 8,
            source_cache_size_mb: 256,
            chunk_cache_size_mb: 512,
            skip_tiles_outside_country: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TILE_SIZE") {
            if let Ok(size) = val.parse() {
                config.tile_size = size;
            }
        }

        if let Ok(val) = std::env::var("REGION_MAX_SIZE") {
            if let Ok(size) = val.parse() {
                config.region_max_size = size;
            }
        }

        if let Ok(val) = std::env::var("TILE_SIDE_LENGTH") {
            if let Ok(length) = val.parse() {
                config.tile_side_length = length;
            }
        }

        if let Ok(val) = std::env::var("SCORE_SENTINEL") {
            if let Ok(sentinel) = val.parse() {
                config.score_sentinel = sentinel;
            }
        }

        if let Ok(val) = std::env::var("SCORE_NORMALIZATION") {
            config.normalization = NormalizationPolicy::from_str(&val);
        }

        if let Ok(val) = std::env::var("RESAMPLING") {
            config.resampling = ResamplingMethod::from_str(&val);
        }

        if let Ok(val) = std::env::var("MAX_CONCURRENT_READS") {
            if let Ok(n) = val.parse() {
                config.max_concurrent_reads = n;
            }
        }

        if let Ok(val) = std::env::var("SOURCE_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.source_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("CHUNK_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.chunk_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("SKIP_TILES_OUTSIDE_COUNTRY") {
            config.skip_tiles_outside_country = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 || self.tile_size > 4096 {
            return Err("tile_size must be 1-4096".to_string());
        }

        if self.region_max_size == 0 || self.region_max_size > 8192 {
            return Err("region_max_size must be 1-8192".to_string());
        }

        if !self.tile_side_length.is_finite() || self.tile_side_length <= 0.0 {
            return Err("tile_side_length must be a positive number".to_string());
        }

        if !self.score_sentinel.is_finite() {
            return Err("score_sentinel must be finite".to_string());
        }

        if self.max_concurrent_reads == 0 {
            return Err("max_concurrent_reads must be > 0".to_string());
        }

        Ok(())
    }

    /// Get the source cache size in bytes.
    pub fn source_cache_size_bytes(&self) -> usize {
        self.source_cache_size_mb * 1024 * 1024
    }

    /// Get the chunk cache size in bytes.
    pub fn chunk_cache_size_bytes(&self) -> usize {
        self.chunk_cache_size_mb * 1024 * 1024
    }
}

/// Where datasets and country files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `s3://bucket` for S3/MinIO, anything else is a local directory.
    pub data_url: String,
    /// S3/MinIO endpoint URL (unset for AWS defaults)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
    /// Key prefix of dataset rasters.
    pub datasets_prefix: String,
    /// Key prefix of country boundaries and statistics.
    pub countries_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_url: "./data".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            region: "us-east-1".to_string(),
            allow_http: true,
            datasets_prefix: "datasets".to_string(),
            countries_prefix: "countries".to_string(),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_url: std::env::var("DATA_URL").unwrap_or(defaults.data_url),
            endpoint: std::env::var("S3_ENDPOINT").ok(),
            access_key_id: std::env::var("S3_ACCESS_KEY").ok(),
            secret_access_key: std::env::var("S3_SECRET_KEY").ok(),
            region: std::env::var("S3_REGION").unwrap_or(defaults.region),
            allow_http: std::env::var("S3_ALLOW_HTTP")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.allow_http),
            datasets_prefix: std::env::var("DATASETS_PREFIX").unwrap_or(defaults.datasets_prefix),
            countries_prefix: std::env::var("COUNTRIES_PREFIX")
                .unwrap_or(defaults.countries_prefix),
        }
    }

    /// Bucket name when `data_url` points at S3.
    pub fn bucket(&self) -> Option<&str> {
        self.data_url
            .strip_prefix("s3://")
            .map(|rest| rest.split('/').next().unwrap_or(rest))
            .filter(|b| !b.is_empty())
    }
}
