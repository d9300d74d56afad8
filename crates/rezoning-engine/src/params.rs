//! Filter and weight specifications parsed from request parameters.

use std::collections::BTreeMap;

use rezoning_common::{LcoeError, LcoeResult};

use crate::registry::{LayerRegistry, PredicateKind};

/// Value supplied for a filter key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterValue {
    Range { min: f64, max: f64 },
    Threshold(f64),
    Flag(bool),
}

impl FilterValue {
    /// `Flag(false)` is the only inactive value.
    pub fn is_active(&self) -> bool {
        !matches!(self, FilterValue::Flag(false))
    }
}

/// Mapping from known filter key to its value.
///
/// Only keys the registry knows are stored; anything else in the request is
/// ignored at parse time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    values: BTreeMap<String, FilterValue>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse query parameters. Unknown keys (including non-filter parameters
    /// such as `color`) are skipped. A known key with a malformed value, or a
    /// value that does not fit its predicate, is an invalid parameter.
    pub fn from_params<'a, I>(params: I, registry: &LayerRegistry) -> LcoeResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut spec = Self::new();
        for (key, raw) in params {
            let Some(filter) = registry.filter(key) else {
                continue;
            };
            let raw = raw.trim();
            if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
                continue;
            }
            let value = match filter.predicate {
                PredicateKind::Range => parse_range(key, raw)?,
                PredicateKind::GreaterThan | PredicateKind::LessThan => {
                    FilterValue::Threshold(parse_number(key, raw)?)
                }
                PredicateKind::Flag => FilterValue::Flag(parse_flag(key, raw)?),
            };
            spec.values.insert(key.to_string(), value);
        }
        Ok(spec)
    }

    /// Insert a value directly. The key is not checked against a registry.
    pub fn insert(&mut self, key: impl Into<String>, value: FilterValue) {
        self.values.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: FilterValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.values.get(key)
    }

    /// Active entries in key order.
    pub fn active(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.values
            .iter()
            .filter(|(_, v)| v.is_active())
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn active_keys(&self) -> impl Iterator<Item = &str> {
        self.active().map(|(k, _)| k)
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }
}

fn parse_number(key: &str, raw: &str) -> LcoeResult<f64> {
    let value: f64 = raw
        .parse()
        .map_err(|_| LcoeError::invalid_parameter(key, format!("expected a number, got '{}'", raw)))?;
    if !value.is_finite() {
        return Err(LcoeError::invalid_parameter(key, "value must be finite"));
    }
    Ok(value)
}

fn parse_range(key: &str, raw: &str) -> LcoeResult<FilterValue> {
    let (min, max) = raw.split_once(',').ok_or_else(|| {
        LcoeError::invalid_parameter(key, format!("expected 'min,max', got '{}'", raw))
    })?;
    let min = parse_number(key, min.trim())?;
    let max = parse_number(key, max.trim())?;
    if min > max {
        return Err(LcoeError::invalid_parameter(
            key,
            format!("range minimum {} exceeds maximum {}", min, max),
        ));
    }
    Ok(FilterValue::Range { min, max })
}

fn parse_flag(key: &str, raw: &str) -> LcoeResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(LcoeError::invalid_parameter(
            key,
            format!("expected a boolean, got '{}'", raw),
        )),
    }
}

/// Mapping from criterion key to a non-negative weight. Unspecified criteria
/// weigh zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightSpec {
    weights: BTreeMap<String, f64>,
}

impl WeightSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of weights. Unknown keys are skipped; a known key
    /// holding a non-number, a negative or a non-finite value is rejected.
    pub fn from_json(
        value: &serde_json::Map<String, serde_json::Value>,
        registry: &LayerRegistry,
    ) -> LcoeResult<Self> {
        let mut spec = Self::new();
        for (key, raw) in value {
            if registry.criterion(key).is_none() || raw.is_null() {
                continue;
            }
            let weight = raw.as_f64().ok_or_else(|| {
                LcoeError::invalid_parameter(key.as_str(), format!("expected a number, got {}", raw))
            })?;
            spec.set(key.as_str(), weight)?;
        }
        Ok(spec)
    }

    /// Set a weight, validating it.
    pub fn set(&mut self, key: &str, weight: f64) -> LcoeResult<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(LcoeError::invalid_parameter(
                key,
                format!("weight must be a finite non-negative number, got {}", weight),
            ));
        }
        self.weights.insert(key.to_string(), weight);
        Ok(())
    }

    pub fn with(mut self, key: &str, weight: f64) -> LcoeResult<Self> {
        self.set(key, weight)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(0.0)
    }

    /// Criteria with a strictly positive weight, in key order.
    pub fn nonzero(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights
            .iter()
            .filter(|(_, &w)| w > 0.0)
            .map(|(k, &w)| (k.as_str(), w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> LayerRegistry {
        LayerRegistry::builtin().unwrap()
    }

    #[test]
    fn test_parse_filter_kinds() {
        let registry = registry();
        let params = [
            ("f_grid", "0,50000"),
            ("f_slope", "20"),
            ("f_protected_areas", "true"),
            ("f_ramsar", "false"),
            ("color", "45,39,88,178"),
            ("f_unknown", "garbage"),
        ];
        let spec = FilterSpec::from_params(params, &registry).unwrap();

        assert_eq!(
            spec.get("f_grid"),
            Some(&FilterValue::Range { min: 0.0, max: 50000.0 })
        );
        assert_eq!(spec.get("f_slope"), Some(&FilterValue::Threshold(20.0)));
        assert_eq!(spec.get("f_protected_areas"), Some(&FilterValue::Flag(true)));
        assert!(spec.get("color").is_none());
        assert!(spec.get("f_unknown").is_none());

        let active: Vec<&str> = spec.active_keys().collect();
        assert_eq!(active, ["f_grid", "f_protected_areas", "f_slope"]);
    }

    #[test]
    fn test_empty_values_are_inactive() {
        let registry = registry();
        let spec = FilterSpec::from_params([("f_grid", ""), ("f_slope", "null")], &registry).unwrap();
        assert!(spec.is_empty());
    }

    #[test]
    fn test_malformed_known_filter_is_rejected() {
        let registry = registry();
        for (key, value) in [
            ("f_grid", "10"),
            ("f_grid", "50,10"),
            ("f_slope", "steep"),
            ("f_slope", "NaN"),
            ("f_protected_areas", "maybe"),
        ] {
            let err = FilterSpec::from_params([(key, value)], &registry).unwrap_err();
            assert_eq!(err.error_kind(), "invalid_parameter", "{}={}", key, value);
        }
    }

    #[test]
    fn test_weights_from_json() {
        let registry = registry();
        let body = json!({"lcoe_gen": 0.5, "slope": 0, "bogus": -3, "pop_density": null});
        let spec = WeightSpec::from_json(body.as_object().unwrap(), &registry).unwrap();
        assert_eq!(spec.get("lcoe_gen"), 0.5);
        assert_eq!(spec.get("slope"), 0.0);
        assert_eq!(spec.get("distance_load"), 0.0);
        let nonzero: Vec<_> = spec.nonzero().collect();
        assert_eq!(nonzero, [("lcoe_gen", 0.5)]);
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let registry = registry();
        let body = json!({"slope": -1.0});
        assert!(WeightSpec::from_json(body.as_object().unwrap(), &registry).is_err());
        let body = json!({"slope": "heavy"});
        assert!(WeightSpec::from_json(body.as_object().unwrap(), &registry).is_err());
    }
}
