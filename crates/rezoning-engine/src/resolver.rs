//! Layer resolver: which datasets a request must read.

use std::collections::HashSet;

use crate::params::{FilterSpec, WeightSpec};
use crate::registry::{CriterionSource, DatasetDef, LayerRegistry};

/// Datasets to read for one request, in the order their layers will appear
/// on the aligned array's layer axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedLayers {
    pub datasets: Vec<DatasetDef>,
}

impl ResolvedLayers {
    /// Datasets referenced by the active filters of a tile request.
    pub fn for_filters(registry: &LayerRegistry, filters: &FilterSpec) -> Self {
        Self {
            datasets: registry
                .datasets_for(filters.active_keys())
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    /// Datasets for a scoring request: active filters, criteria with a
    /// non-zero weight, and the inputs of the LCOE model (capacity factor,
    /// transmission and road distance).
    pub fn for_scoring(
        registry: &LayerRegistry,
        filters: &FilterSpec,
        weights: &WeightSpec,
        capacity_factor: &str,
    ) -> Self {
        let lcoe = registry.lcoe_layers();
        let mut layers: Vec<&str> = filters
            .active_keys()
            .filter_map(|key| registry.layer_for_filter(key))
            .collect();

        for (key, _) in weights.nonzero() {
            if let Some(CriterionSource::Layer(layer)) = registry.criterion(key).map(|c| &c.source) {
                layers.push(layer);
            }
        }

        layers.push(capacity_factor);
        layers.push(&lcoe.transmission_distance);
        layers.push(&lcoe.road_distance);

        Self {
            datasets: registry
                .datasets_for_layers(layers)
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn dataset_ids(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|d| d.id.as_str())
    }

    /// Length of the layer axis once every dataset is read.
    pub fn layer_count(&self) -> usize {
        self.datasets.iter().map(|d| d.layers.len()).sum()
    }

    /// Whether `layer` will be on the layer axis.
    pub fn provides(&self, layer: &str) -> bool {
        self.datasets
            .iter()
            .flat_map(|d| d.layers.iter())
            .any(|l| l == layer)
    }

    /// Every layer on the layer axis.
    pub fn layers(&self) -> HashSet<&str> {
        self.datasets
            .iter()
            .flat_map(|d| d.layers.iter().map(String::as_str))
            .collect()
    }
}
