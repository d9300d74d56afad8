//! Layer registry.
//!
//! Static catalog of datasets, the layers (bands) each dataset provides, the
//! filter keys that constrain those layers and the weight criteria used for
//! scoring. The registry is loaded once at startup, validated, and shared
//! read-only through an `Arc`.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

use rezoning_common::{LcoeError, LcoeResult};

/// Registry shipped with the crate.
const BUILTIN_REGISTRY: &str = include_str!("../config/layers.yaml");

/// Layer semantic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Continuous measurement (distance, irradiance, slope, ...).
    Continuous,
    /// Binary exclusion flag: 1 where the pixel is covered by the feature.
    Exclusion,
}

/// A named layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDef {
    pub name: String,
    pub title: String,
    pub unit: Option<String>,
    pub kind: LayerKind,
    /// Declared value domain (min, max).
    pub domain: (f64, f64),
    /// Native no-data sentinel, if the source does not declare one itself.
    pub nodata: Option<f32>,
}

/// Structural kind of a dataset's storage object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Virtual mosaic (`.vrt`) assembled from several GeoTIFFs.
    Mosaic,
    /// Single GeoTIFF (`.tif`).
    File,
}

impl SourceKind {
    pub fn extension(&self) -> &'static str {
        match self {
            SourceKind::Mosaic => "vrt",
            SourceKind::File => "tif",
        }
    }

    /// Naming convention used when a dataset does not declare its kind.
    pub fn infer(dataset_id: &str) -> Self {
        if dataset_id.contains("raster") {
            SourceKind::Mosaic
        } else {
            SourceKind::File
        }
    }
}

/// A dataset: ordered, non-empty list of layers sharing one source and grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetDef {
    pub id: String,
    pub source: SourceKind,
    pub layers: Vec<String>,
    /// Registry no-data sentinel of each layer, in band order. Filled in when
    /// the registry is built.
    pub nodata: Vec<Option<f32>>,
}

impl DatasetDef {
    /// Object storage key for this dataset under `prefix`.
    pub fn storage_key(&self, prefix: &str) -> String {
        let file = format!("{}.{}", self.id, self.source.extension());
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            file
        } else {
            format!("{}/{}", prefix, file)
        }
    }

    /// Sentinel to mask on `band` when the source declares none.
    pub fn fallback_nodata(&self, band: usize) -> Option<f32> {
        self.nodata.get(band).copied().flatten()
    }
}

/// Predicate applied by a filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    /// `min <= v <= max`
    Range,
    /// `v >= threshold`
    GreaterThan,
    /// `v <= threshold`
    LessThan,
    /// Exclude pixels flagged by an exclusion layer.
    Flag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDef {
    pub key: String,
    pub layer: String,
    pub predicate: PredicateKind,
}

/// Component of the LCOE cost model a criterion can weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LcoeComponent {
    Generation,
    Transmission,
    Road,
}

/// What a weight criterion scores.
#[derive(Debug, Clone, PartialEq)]
pub enum CriterionSource {
    /// A raw registry layer.
    Layer(String),
    /// A plane derived by the LCOE model.
    Lcoe(LcoeComponent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriterionDef {
    pub key: String,
    pub title: String,
    pub description: String,
    pub source: CriterionSource,
}

/// Layers the LCOE model reads.
#[derive(Debug, Clone, PartialEq)]
pub struct LcoeLayers {
    /// Layers accepted as `capacity_factor`. The first one is the default.
    pub capacity_factors: Vec<String>,
    pub transmission_distance: String,
    pub road_distance: String,
}

// ============================================================================
// YAML Parsing Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct YamlRegistry {
    datasets: Vec<YamlDataset>,
    layers: Vec<YamlLayer>,
    #[serde(default)]
    filters: Vec<YamlFilter>,
    #[serde(default)]
    criteria: Vec<YamlCriterion>,
    lcoe: YamlLcoe,
}

#[derive(Debug, Deserialize)]
struct YamlDataset {
    id: String,
    #[serde(default)]
    source: Option<SourceKind>,
    layers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct YamlLayer {
    name: String,
    title: String,
    #[serde(default)]
    unit: Option<String>,
    kind: LayerKind,
    #[serde(default)]
    domain: Option<(f64, f64)>,
    #[serde(default)]
    nodata: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct YamlFilter {
    key: String,
    layer: String,
    predicate: PredicateKind,
}

#[derive(Debug, Deserialize)]
struct YamlCriterion {
    key: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    layer: Option<String>,
    #[serde(default)]
    lcoe: Option<LcoeComponent>,
}

#[derive(Debug, Deserialize)]
struct YamlLcoe {
    capacity_factors: Vec<String>,
    transmission_distance: String,
    road_distance: String,
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable catalog of datasets, layers, filters and criteria.
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    datasets: Vec<DatasetDef>,
    layers: Vec<LayerDef>,
    filters: Vec<FilterDef>,
    criteria: Vec<CriterionDef>,
    lcoe: LcoeLayers,
    layer_index: HashMap<String, usize>,
    dataset_of_layer: HashMap<String, usize>,
    filter_index: HashMap<String, usize>,
    criterion_index: HashMap<String, usize>,
}

impl LayerRegistry {
    /// Registry embedded in the crate.
    pub fn builtin() -> LcoeResult<Self> {
        Self::from_yaml_str(BUILTIN_REGISTRY)
    }

    /// Load from a YAML file on disk.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> LcoeResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LcoeError::Config(format!(
                "failed to read layer registry {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let registry = Self::from_yaml_str(&contents)?;
        info!(
            path = %path.as_ref().display(),
            datasets = registry.datasets.len(),
            layers = registry.layers.len(),
            "Loaded layer registry"
        );
        Ok(registry)
    }

    /// Parse and validate a YAML registry document.
    pub fn from_yaml_str(contents: &str) -> LcoeResult<Self> {
        let yaml: YamlRegistry = serde_yaml::from_str(contents)
            .map_err(|e| LcoeError::Config(format!("invalid layer registry: {}", e)))?;

        let datasets = yaml
            .datasets
            .into_iter()
            .map(|d| DatasetDef {
                source: d.source.unwrap_or_else(|| SourceKind::infer(&d.id)),
                id: d.id,
                layers: d.layers,
                nodata: Vec::new(),
            })
            .collect();

        let layers = yaml
            .layers
            .into_iter()
            .map(|l| LayerDef {
                domain: l.domain.unwrap_or((0.0, 1.0)),
                name: l.name,
                title: l.title,
                unit: l.unit,
                kind: l.kind,
                nodata: l.nodata,
            })
            .collect();

        let filters = yaml
            .filters
            .into_iter()
            .map(|f| FilterDef {
                key: f.key,
                layer: f.layer,
                predicate: f.predicate,
            })
            .collect();

        let criteria = yaml
            .criteria
            .into_iter()
            .map(|c| {
                let source = match (c.layer, c.lcoe) {
                    (Some(layer), None) => CriterionSource::Layer(layer),
                    (None, Some(component)) => CriterionSource::Lcoe(component),
                    _ => {
                        return Err(LcoeError::Config(format!(
                            "criterion '{}' must declare exactly one of `layer` or `lcoe`",
                            c.key
                        )))
                    }
                };
                Ok(CriterionDef {
                    key: c.key,
                    title: c.title,
                    description: c.description,
                    source,
                })
            })
            .collect::<LcoeResult<Vec<_>>>()?;

        let lcoe = LcoeLayers {
            capacity_factors: yaml.lcoe.capacity_factors,
            transmission_distance: yaml.lcoe.transmission_distance,
            road_distance: yaml.lcoe.road_distance,
        };

        Self::new(datasets, layers, filters, criteria, lcoe)
    }

    /// Build a registry from parts, validating cross references.
    pub fn new(
        mut datasets: Vec<DatasetDef>,
        layers: Vec<LayerDef>,
        filters: Vec<FilterDef>,
        criteria: Vec<CriterionDef>,
        lcoe: LcoeLayers,
    ) -> LcoeResult<Self> {
        let mut layer_index = HashMap::new();
        for (i, layer) in layers.iter().enumerate() {
            if layer_index.insert(layer.name.clone(), i).is_some() {
                return Err(config_error(format!("duplicate layer '{}'", layer.name)));
            }
            let (min, max) = layer.domain;
            if min.is_nan() || max.is_nan() || min > max {
                return Err(config_error(format!(
                    "layer '{}' has an empty domain",
                    layer.name
                )));
            }
        }

        let mut dataset_ids = HashSet::new();
        let mut dataset_of_layer = HashMap::new();
        for (i, dataset) in datasets.iter().enumerate() {
            if !dataset_ids.insert(dataset.id.as_str()) {
                return Err(config_error(format!("duplicate dataset '{}'", dataset.id)));
            }
            if dataset.layers.is_empty() {
                return Err(config_error(format!(
                    "dataset '{}' declares no layers",
                    dataset.id
                )));
            }
            for layer in &dataset.layers {
                if !layer_index.contains_key(layer) {
                    return Err(config_error(format!(
                        "dataset '{}' references unknown layer '{}'",
                        dataset.id, layer
                    )));
                }
                if dataset_of_layer.insert(layer.clone(), i).is_some() {
                    return Err(config_error(format!(
                        "layer '{}' is provided by more than one dataset",
                        layer
                    )));
                }
            }
        }

        for dataset in &mut datasets {
            dataset.nodata = dataset
                .layers
                .iter()
                .map(|l| layer_index.get(l).and_then(|&i| layers[i].nodata))
                .collect();
        }

        let require_dataset = |layer: &str, what: &str| -> LcoeResult<()> {
            if dataset_of_layer.contains_key(layer) {
                Ok(())
            } else {
                Err(config_error(format!(
                    "{} references layer '{}' which no dataset provides",
                    what, layer
                )))
            }
        };

        let mut filter_index = HashMap::new();
        for (i, filter) in filters.iter().enumerate() {
            require_dataset(&filter.layer, &format!("filter '{}'", filter.key))?;
            if filter_index.insert(filter.key.clone(), i).is_some() {
                return Err(config_error(format!("duplicate filter '{}'", filter.key)));
            }
        }

        let mut criterion_index = HashMap::new();
        for (i, criterion) in criteria.iter().enumerate() {
            if let CriterionSource::Layer(layer) = &criterion.source {
                require_dataset(layer, &format!("criterion '{}'", criterion.key))?;
            }
            if criterion_index.insert(criterion.key.clone(), i).is_some() {
                return Err(config_error(format!(
                    "duplicate criterion '{}'",
                    criterion.key
                )));
            }
        }

        if lcoe.capacity_factors.is_empty() {
            return Err(config_error("lcoe.capacity_factors is empty".to_string()));
        }
        for layer in &lcoe.capacity_factors {
            require_dataset(layer, "lcoe.capacity_factors")?;
        }
        require_dataset(&lcoe.transmission_distance, "lcoe.transmission_distance")?;
        require_dataset(&lcoe.road_distance, "lcoe.road_distance")?;

        Ok(Self {
            datasets,
            layers,
            filters,
            criteria,
            lcoe,
            layer_index,
            dataset_of_layer,
            filter_index,
            criterion_index,
        })
    }

    /// Ordered layer names of a dataset; empty for unknown ids.
    pub fn layers_for(&self, dataset_id: &str) -> &[String] {
        self.dataset(dataset_id)
            .map(|d| d.layers.as_slice())
            .unwrap_or(&[])
    }

    /// Layer constrained by a filter key; `None` for unknown keys.
    pub fn layer_for_filter(&self, filter_key: &str) -> Option<&str> {
        self.filter(filter_key).map(|f| f.layer.as_str())
    }

    /// Datasets providing at least one layer referenced by the filter keys,
    /// in declaration order. Unknown keys contribute nothing.
    pub fn datasets_for<'a, I>(&self, filter_keys: I) -> Vec<&DatasetDef>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.datasets_for_layers(
            filter_keys
                .into_iter()
                .filter_map(|key| self.layer_for_filter(key)),
        )
    }

    /// Datasets providing at least one of the named layers, in declaration order.
    pub fn datasets_for_layers<'a, I>(&self, layers: I) -> Vec<&DatasetDef>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut needed = vec![false; self.datasets.len()];
        for layer in layers {
            if let Some(&i) = self.dataset_of_layer.get(layer) {
                needed[i] = true;
            }
        }
        self.datasets
            .iter()
            .zip(needed)
            .filter_map(|(d, n)| n.then_some(d))
            .collect()
    }

    pub fn dataset(&self, id: &str) -> Option<&DatasetDef> {
        self.datasets.iter().find(|d| d.id == id)
    }

    pub fn layer(&self, name: &str) -> Option<&LayerDef> {
        self.layer_index.get(name).map(|&i| &self.layers[i])
    }

    pub fn filter(&self, key: &str) -> Option<&FilterDef> {
        self.filter_index.get(key).map(|&i| &self.filters[i])
    }

    pub fn criterion(&self, key: &str) -> Option<&CriterionDef> {
        self.criterion_index.get(key).map(|&i| &self.criteria[i])
    }

    pub fn datasets(&self) -> &[DatasetDef] {
        &self.datasets
    }

    pub fn layers(&self) -> &[LayerDef] {
        &self.layers
    }

    /// Filters in declaration order.
    pub fn filters(&self) -> &[FilterDef] {
        &self.filters
    }

    /// Criteria in declaration order.
    pub fn criteria(&self) -> &[CriterionDef] {
        &self.criteria
    }

    pub fn lcoe_layers(&self) -> &LcoeLayers {
        &self.lcoe
    }

    /// True when `layer` may be used as the LCOE capacity factor.
    pub fn is_capacity_factor(&self, layer: &str) -> bool {
        self.lcoe.capacity_factors.iter().any(|cf| cf == layer)
    }
}

fn config_error(message: String) -> LcoeError {
    LcoeError::Config(format!("layer registry: {}", message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LayerRegistry {
        LayerRegistry::builtin().expect("builtin registry is valid")
    }

    #[test]
    fn test_builtin_registry_loads() {
        let registry = registry();
        assert_eq!(registry.datasets().len(), 3);
        assert_eq!(
            registry.layers_for("raster-exclusions"),
            ["protected_areas", "ramsar", "unesco_whs", "coral_reefs"]
        );
        assert_eq!(registry.dataset("raster-exclusions").unwrap().source, SourceKind::Mosaic);
        assert_eq!(registry.dataset("calc").unwrap().source, SourceKind::File);
    }

    #[test]
    fn test_unknown_inputs_are_empty() {
        let registry = registry();
        assert!(registry.layers_for("nope").is_empty());
        assert!(registry.layer_for_filter("f_nope").is_none());
        assert!(registry.datasets_for(["f_nope", "color"]).is_empty());
    }

    #[test]
    fn test_datasets_for_dedups_in_declaration_order() {
        let registry = registry();
        let ids: Vec<&str> = registry
            .datasets_for(["f_protected_areas", "f_slope", "f_grid", "f_roads"])
            .into_iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, ["distances", "calc", "raster-exclusions"]);
    }

    #[test]
    fn test_storage_key() {
        let registry = registry();
        let mosaic = registry.dataset("raster-exclusions").unwrap();
        assert_eq!(mosaic.storage_key("datasets/"), "datasets/raster-exclusions.vrt");
        let file = registry.dataset("distances").unwrap();
        assert_eq!(file.storage_key(""), "distances.tif");
    }

    #[test]
    fn test_dataset_carries_layer_nodata_in_band_order() {
        let registry = registry();
        let distances = registry.dataset("distances").unwrap();
        assert_eq!(distances.nodata.len(), distances.layers.len());
        assert_eq!(distances.fallback_nodata(0), Some(-9999.0));

        let exclusions = registry.dataset("raster-exclusions").unwrap();
        assert!(exclusions.nodata.iter().all(Option::is_none));
        assert_eq!(exclusions.fallback_nodata(99), None);
    }

    #[test]
    fn test_source_kind_inferred_from_id() {
        assert_eq!(SourceKind::infer("raster-exclusions"), SourceKind::Mosaic);
        assert_eq!(SourceKind::infer("calc"), SourceKind::File);
    }

    #[test]
    fn test_rejects_dangling_filter_layer() {
        let yaml = r#"
datasets:
  - id: calc
    layers: [slope]
layers:
  - name: slope
    title: Slope
    kind: continuous
filters:
  - key: f_wind
    layer: wind
    predicate: range
lcoe:
  capacity_factors: [slope]
  transmission_distance: slope
  road_distance: slope
"#;
        let err = LayerRegistry::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, LcoeError::Config(_)));
        assert!(err.to_string().contains("f_wind"));
    }

    #[test]
    fn test_rejects_layer_in_two_datasets() {
        let yaml = r#"
datasets:
  - id: a
    layers: [slope]
  - id: b
    layers: [slope]
layers:
  - name: slope
    title: Slope
    kind: continuous
lcoe:
  capacity_factors: [slope]
  transmission_distance: slope
  road_distance: slope
"#;
        assert!(LayerRegistry::from_yaml_str(yaml).is_err());
    }
}
