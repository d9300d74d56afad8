//! Filter evaluator: per-pixel conjunction of layer predicates.

use rayon::prelude::*;

use rezoning_common::{LcoeError, LcoeResult};

use crate::params::{FilterSpec, FilterValue};
use crate::registry::{LayerRegistry, PredicateKind};
use crate::types::AlignedArray;

/// Outcome of evaluating a filter specification over an aligned array.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    /// True where every active filter holds and the pixel is in the footprint.
    pub mask: Vec<bool>,
    /// The mask as 0.0 / 1.0, ready for color compositing.
    pub tile: Vec<f32>,
}

impl FilterResult {
    pub fn from_mask(mask: Vec<bool>) -> Self {
        let tile = mask.iter().map(|&m| if m { 1.0 } else { 0.0 }).collect();
        Self { mask, tile }
    }

    /// All-excluded result of `len` pixels.
    pub fn empty(len: usize) -> Self {
        Self::from_mask(vec![false; len])
    }

    pub fn included(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
}

/// A predicate bound to its value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate {
    Range { min: f64, max: f64 },
    AtLeast(f64),
    AtMost(f64),
    /// Pixel not flagged by an exclusion layer.
    FlagClear,
}

impl Predicate {
    /// Bind a filter's predicate kind to a request value. `None` when the
    /// value does not constrain anything (an unset flag).
    pub fn bind(key: &str, kind: PredicateKind, value: &FilterValue) -> LcoeResult<Option<Self>> {
        let predicate = match (kind, *value) {
            (PredicateKind::Range, FilterValue::Range { min, max }) => Predicate::Range { min, max },
            (PredicateKind::GreaterThan, FilterValue::Threshold(t)) => Predicate::AtLeast(t),
            (PredicateKind::LessThan, FilterValue::Threshold(t)) => Predicate::AtMost(t),
            (PredicateKind::Flag, FilterValue::Flag(true)) => Predicate::FlagClear,
            (PredicateKind::Flag, FilterValue::Flag(false)) => return Ok(None),
            (kind, value) => {
                return Err(LcoeError::invalid_parameter(
                    key,
                    format!("{:?} does not fit a {:?} filter", value, kind),
                ))
            }
        };
        Ok(Some(predicate))
    }

    /// No-data never passes.
    #[inline]
    pub fn test(&self, v: f32) -> bool {
        if v.is_nan() {
            return false;
        }
        let v = v as f64;
        match *self {
            Predicate::Range { min, max } => v >= min && v <= max,
            Predicate::AtLeast(t) => v >= t,
            Predicate::AtMost(t) => v <= t,
            Predicate::FlagClear => v == 0.0,
        }
    }
}

/// Evaluate the active filters of `filters` over `array`.
///
/// Each filter's plane is found through the array's own layer index, so the
/// result does not depend on which other datasets the request read. Keys the
/// registry does not know are ignored. With no active filters the mask is
/// the region footprint.
pub fn evaluate(
    array: &AlignedArray,
    filters: &FilterSpec,
    registry: &LayerRegistry,
) -> LcoeResult<FilterResult> {
    let mut mask = array.footprint.clone();

    for (key, value) in filters.active() {
        let Some(filter) = registry.filter(key) else {
            continue;
        };
        let Some(predicate) = Predicate::bind(key, filter.predicate, value)? else {
            continue;
        };
        let plane = array.plane(&filter.layer).ok_or_else(|| {
            LcoeError::Internal(format!(
                "filter '{}' needs layer '{}' which was not read",
                key, filter.layer
            ))
        })?;

        mask.par_iter_mut()
            .zip(plane.par_iter())
            .for_each(|(m, &v)| *m = *m && predicate.test(v));
    }

    Ok(FilterResult::from_mask(mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DatasetArray, Region};
    use rezoning_common::{Geometry, Polygon};

    fn registry() -> LayerRegistry {
        LayerRegistry::builtin().unwrap()
    }

    /// 2x2 region with a `calc` dataset whose every layer is `plane`, except
    /// `slope` which gets `slope`.
    fn array(registry: &LayerRegistry, slope: Vec<f32>) -> AlignedArray {
        let aoi = Geometry::Polygon(Polygon::new(vec![
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (0.0, 0.0),
        ]));
        let region = Region::polygon(aoi, 2, None).unwrap();
        let layers = registry.layers_for("calc").to_vec();
        let planes = layers
            .iter()
            .map(|l| if l == "slope" { slope.clone() } else { vec![1.0; 4] })
            .collect();
        AlignedArray::concat(
            &region,
            vec![DatasetArray {
                dataset: "calc".into(),
                layers,
                planes,
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_no_filters_keeps_footprint() {
        let registry = registry();
        let array = array(&registry, vec![0.0; 4]);
        let result = evaluate(&array, &FilterSpec::new(), &registry).unwrap();
        assert_eq!(result.mask, vec![true; 4]);
        assert_eq!(result.tile, vec![1.0; 4]);
    }

    #[test]
    fn test_threshold_and_nan() {
        let registry = registry();
        let array = array(&registry, vec![5.0, 25.0, f32::NAN, 20.0]);
        let filters = FilterSpec::new().with("f_slope", FilterValue::Threshold(20.0));
        let result = evaluate(&array, &filters, &registry).unwrap();
        assert_eq!(result.mask, vec![true, false, false, true]);
        assert_eq!(result.included(), 2);
    }

    #[test]
    fn test_predicates_reject_nan() {
        for p in [
            Predicate::Range { min: f64::MIN, max: f64::MAX },
            Predicate::AtLeast(f64::MIN),
            Predicate::AtMost(f64::MAX),
            Predicate::FlagClear,
        ] {
            assert!(!p.test(f32::NAN));
        }
        assert!(Predicate::FlagClear.test(0.0));
        assert!(!Predicate::FlagClear.test(1.0));
        assert!(Predicate::Range { min: 1.0, max: 2.0 }.test(2.0));
    }

    #[test]
    fn test_mismatched_value_is_invalid_parameter() {
        let registry = registry();
        let array = array(&registry, vec![0.0; 4]);
        let filters = FilterSpec::new().with("f_slope", FilterValue::Flag(true));
        let err = evaluate(&array, &filters, &registry).unwrap_err();
        assert_eq!(err.error_kind(), "invalid_parameter");
    }

    #[test]
    fn test_missing_layer_is_internal_error() {
        let registry = registry();
        let array = array(&registry, vec![0.0; 4]);
        let filters = FilterSpec::new().with("f_grid", FilterValue::Range { min: 0.0, max: 1.0 });
        let err = evaluate(&array, &filters, &registry).unwrap_err();
        assert!(matches!(err, LcoeError::Internal(_)));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let registry = registry();
        let array = array(&registry, vec![0.0; 4]);
        let filters = FilterSpec::new().with("f_unknown", FilterValue::Threshold(1.0));
        assert_eq!(evaluate(&array, &filters, &registry).unwrap().included(), 4);
    }
}
