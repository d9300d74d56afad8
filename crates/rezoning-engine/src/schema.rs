//! Filter and weight schemas for client-side form generation.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::registry::{LayerKind, LayerRegistry, PredicateKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSchemaEntry {
    pub title: String,
    /// `range_filter`, `threshold_filter` or `boolean`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub layer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    /// `gte` or `lte` for threshold filters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightSchemaEntry {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub gte: f64,
    pub lte: f64,
    pub default: f64,
}

/// Every recognized filter key.
pub fn filter_schema(registry: &LayerRegistry) -> BTreeMap<String, FilterSchemaEntry> {
    registry
        .filters()
        .iter()
        .filter_map(|filter| {
            let layer = registry.layer(&filter.layer)?;
            let (kind, comparison) = match filter.predicate {
                PredicateKind::Range => ("range_filter", None),
                PredicateKind::GreaterThan => ("threshold_filter", Some("gte")),
                PredicateKind::LessThan => ("threshold_filter", Some("lte")),
                PredicateKind::Flag => ("boolean", None),
            };
            let range = (layer.kind == LayerKind::Continuous).then_some(layer.domain);
            Some((
                filter.key.clone(),
                FilterSchemaEntry {
                    title: layer.title.clone(),
                    kind,
                    layer: layer.name.clone(),
                    unit: layer.unit.clone(),
                    range,
                    comparison,
                },
            ))
        })
        .collect()
}

/// Every recognized weight key.
pub fn weight_schema(registry: &LayerRegistry) -> BTreeMap<String, WeightSchemaEntry> {
    registry
        .criteria()
        .iter()
        .map(|criterion| {
            (
                criterion.key.clone(),
                WeightSchemaEntry {
                    title: criterion.title.clone(),
                    description: criterion.description.clone(),
                    kind: "number",
                    gte: 0.0,
                    lte: 1.0,
                    default: 1.0,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_schema_has_every_filter_key() {
        let registry = LayerRegistry::builtin().unwrap();
        let schema = filter_schema(&registry);
        let mut expected: Vec<_> = registry.filters().iter().map(|f| f.key.clone()).collect();
        expected.sort();
        assert_eq!(schema.keys().cloned().collect::<Vec<_>>(), expected);

        assert_eq!(schema["f_grid"].kind, "range_filter");
        assert_eq!(schema["f_slope"].comparison, Some("lte"));
        assert_eq!(schema["f_protected_areas"].kind, "boolean");
        assert!(schema["f_protected_areas"].range.is_none());
    }

    #[test]
    fn test_schemas_are_stable() {
        let registry = LayerRegistry::builtin().unwrap();
        let a = serde_json::to_string(&filter_schema(&registry)).unwrap();
        let b = serde_json::to_string(&filter_schema(&registry)).unwrap();
        assert_eq!(a, b);

        let weights = serde_json::to_value(weight_schema(&registry)).unwrap();
        assert_eq!(weights["slope"]["type"], "number");
        assert_eq!(weights["lcoe_gen"]["gte"], 0.0);
        assert_eq!(weights.as_object().unwrap().len(), registry.criteria().len());
    }
}
