//! Renewable-energy rezoning engine.
//!
//! Resolves which raster datasets a request needs, reads and aligns them over
//! the request region, evaluates per-pixel filter conjunctions and reduces
//! weighted criteria and the LCOE cost model to a zone score.

pub mod config;
pub mod countries;
pub mod evaluator;
pub mod lcoe;
pub mod params;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod score;
pub mod storage;
pub mod types;

pub use config::{EngineConfig, StorageConfig};
pub use countries::{public_bounds, CountryStore, LayerBounds, RESERVED_PREFIXES};
pub use evaluator::{evaluate, FilterResult, Predicate};
pub use lcoe::{LcoeParams, LcoePlanes};
pub use params::{FilterSpec, FilterValue, WeightSpec};
pub use pipeline::{Engine, ZoneRequest};
pub use reader::{DatasetReader, MemoryReader, RasterStoreReader, RasterWindow, ResamplingMethod};
pub use registry::{
    CriterionDef, CriterionSource, DatasetDef, FilterDef, LayerDef, LayerKind, LayerRegistry,
    LcoeComponent, PredicateKind, SourceKind,
};
pub use resolver::ResolvedLayers;
pub use schema::{filter_schema, weight_schema, FilterSchemaEntry, WeightSchemaEntry};
pub use score::{NormalizationPolicy, ScoreSettings};
pub use storage::ObjectStorage;
pub use types::{AlignedArray, DatasetArray, GridKind, GridSpec, LayerIndex, Region, ZoneScore};
