//! Score calculator: weighted composite and zone-level reductions.
//!
//! Excluded pixels (mask false) and no-data pixels are removed from every
//! reduction domain; they are never counted as zero. Undefined reductions
//! resolve to explicit fallbacks so a zone score never carries NaN.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::ZoneScore;

/// How a criterion plane is scaled to [0, 1] before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationPolicy {
    /// Min-max over the included, finite pixels of the request.
    #[default]
    MinMax,
    /// The layer's declared domain, clamped. Planes without a declared
    /// domain fall back to `MinMax`.
    Fixed,
    /// Raw values.
    Identity,
}

impl NormalizationPolicy {
    /// Parse from string (case-insensitive); unknown values give `MinMax`.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fixed" | "domain" => Self::Fixed,
            "identity" | "none" => Self::Identity,
            _ => Self::MinMax,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinMax => "min_max",
            Self::Fixed => "fixed",
            Self::Identity => "identity",
        }
    }
}

/// Score settings taken from the engine configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSettings {
    pub normalization: NormalizationPolicy,
    /// Zone score when the composite mean is undefined.
    pub sentinel: f64,
    /// Side length `L` in `zone_output_density = zone_output / L²`.
    pub tile_side_length: f64,
}

impl From<&EngineConfig> for ScoreSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            normalization: config.normalization,
            sentinel: config.score_sentinel,
            tile_side_length: config.tile_side_length,
        }
    }
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// A weighted criterion plane.
#[derive(Debug, Clone, Copy)]
pub struct WeightedPlane<'a> {
    pub weight: f64,
    pub plane: &'a [f32],
    /// Declared value domain, used by `NormalizationPolicy::Fixed`.
    pub domain: Option<(f64, f64)>,
}

/// Planes consumed by [`score`], all on the same grid as the mask.
#[derive(Debug, Clone)]
pub struct ScoreInputs<'a> {
    pub criteria: Vec<WeightedPlane<'a>>,
    /// Total LCOE per pixel.
    pub lcoe: &'a [f32],
    pub capacity_factor: &'a [f32],
}

/// Scale `plane` to [0, 1] under `policy`. Excluded pixels become NaN.
pub fn normalize(
    plane: &[f32],
    mask: &[bool],
    policy: NormalizationPolicy,
    domain: Option<(f64, f64)>,
) -> Vec<f32> {
    let range = match (policy, domain) {
        (NormalizationPolicy::Identity, _) => None,
        (NormalizationPolicy::Fixed, Some(domain)) => Some(domain),
        _ => min_max(plane, mask),
    };

    plane
        .iter()
        .zip(mask)
        .map(|(&v, &m)| {
            if !m || v.is_nan() {
                return f32::NAN;
            }
            match (policy, range) {
                (NormalizationPolicy::Identity, _) => v,
                (_, Some((lo, hi))) if hi > lo => (((v as f64 - lo) / (hi - lo)).clamp(0.0, 1.0)) as f32,
                // Constant plane (or nothing to scale against)
                _ => 0.0,
            }
        })
        .collect()
}

fn min_max(plane: &[f32], mask: &[bool]) -> Option<(f64, f64)> {
    plane
        .iter()
        .zip(mask)
        .filter(|&(v, &m)| m && v.is_finite())
        .fold(None, |acc, (&v, _)| {
            let v = v as f64;
            Some(match acc {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            })
        })
}

/// Per-pixel weighted composite. Pixels that are excluded, or no-data on a
/// weighted criterion, are NaN. With no weighted criteria the composite is
/// 0 on every included pixel.
pub fn composite(inputs: &ScoreInputs, mask: &[bool], policy: NormalizationPolicy) -> Vec<f32> {
    let mut composite: Vec<f32> = mask.iter().map(|&m| if m { 0.0 } else { f32::NAN }).collect();

    for criterion in inputs.criteria.iter().filter(|c| c.weight > 0.0) {
        let normalized = normalize(criterion.plane, mask, policy, criterion.domain);
        for (c, n) in composite.iter_mut().zip(normalized) {
            *c += (criterion.weight * n as f64) as f32;
        }
    }
    composite
}

/// Mean over included, finite values; `None` when the domain is empty.
fn masked_mean(plane: &[f32], mask: &[bool]) -> Option<f64> {
    let (sum, count) = plane
        .iter()
        .zip(mask)
        .filter(|&(v, &m)| m && v.is_finite())
        .fold((0.0f64, 0usize), |(s, n), (&v, _)| (s + v as f64, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn masked_sum(plane: &[f32], mask: &[bool]) -> f64 {
    plane
        .iter()
        .zip(mask)
        .filter(|&(v, &m)| m && v.is_finite())
        .map(|(&v, _)| v as f64)
        .sum()
}

/// Reduce a scoring request to its zone score.
///
/// - `zone_score`: mean composite, or `settings.sentinel` when undefined
/// - `lcoe`: mean total LCOE, or 0.0 when undefined
/// - `zone_output`: sum of the capacity factor (0.0 when nothing is included)
/// - `zone_output_density`: `zone_output / L²`
pub fn score(inputs: &ScoreInputs, mask: &[bool], settings: &ScoreSettings) -> ZoneScore {
    let composite = composite(inputs, mask, settings.normalization);

    let zone_score = match masked_mean(&composite, mask) {
        Some(mean) if mean.is_finite() => mean,
        _ => settings.sentinel,
    };
    let lcoe = masked_mean(inputs.lcoe, mask)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);
    let zone_output = masked_sum(inputs.capacity_factor, mask);
    let zone_output_density = zone_output / (settings.tile_side_length * settings.tile_side_length);

    ZoneScore {
        lcoe,
        zone_score,
        zone_output,
        zone_output_density,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(criteria: Vec<WeightedPlane<'a>>, lcoe: &'a [f32], cf: &'a [f32]) -> ScoreInputs<'a> {
        ScoreInputs {
            criteria,
            lcoe,
            capacity_factor: cf,
        }
    }

    #[test]
    fn test_all_false_mask_uses_sentinel() {
        let plane = [1.0, 2.0, 3.0, 4.0];
        let cf = [0.3; 4];
        let criteria = vec![WeightedPlane {
            weight: 1.0,
            plane: &plane,
            domain: None,
        }];
        let result = score(&inputs(criteria, &plane, &cf), &[false; 4], &ScoreSettings::default());
        assert_eq!(result.zone_score, 0.01);
        assert_eq!(result.zone_output, 0.0);
        assert_eq!(result.zone_output_density, 0.0);
        assert_eq!(result.lcoe, 0.0);
    }

    #[test]
    fn test_min_max_composite_mean() {
        let a = [0.0, 5.0, 10.0, 100.0];
        let b = [1.0, 1.0, 1.0, 1.0];
        let cf = [0.2, 0.3, 0.5, 0.9];
        let lcoe = [10.0, 20.0, 30.0, 40.0];
        let mask = [true, true, true, false];
        let criteria = vec![
            WeightedPlane { weight: 2.0, plane: &a, domain: None },
            // Constant plane normalizes to 0
            WeightedPlane { weight: 1.0, plane: &b, domain: None },
        ];
        let result = score(&inputs(criteria, &lcoe, &cf), &mask, &ScoreSettings::default());
        // normalized a over included = [0, 0.5, 1] -> composite [0, 1, 2]
        assert!((result.zone_score - 1.0).abs() < 1e-6);
        assert!((result.lcoe - 20.0).abs() < 1e-9);
        assert!((result.zone_output - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_output_density_is_sum_over_side_squared() {
        let cf = [0.25, 0.5, f32::NAN, 0.75];
        let settings = ScoreSettings {
            tile_side_length: 500.0,
            ..Default::default()
        };
        let result = score(&inputs(vec![], &cf, &cf), &[true; 4], &settings);
        assert_eq!(result.zone_output, 1.5);
        assert_eq!(result.zone_output_density, 1.5 / (500.0 * 500.0));
    }

    #[test]
    fn test_zero_weights_score_zero() {
        let plane = [1.0, 2.0];
        let criteria = vec![WeightedPlane { weight: 0.0, plane: &plane, domain: None }];
        let result = score(&inputs(criteria, &plane, &plane), &[true, true], &ScoreSettings::default());
        assert_eq!(result.zone_score, 0.0);
    }

    #[test]
    fn test_nan_criterion_leaves_domain() {
        let a = [f32::NAN, f32::NAN];
        let criteria = vec![WeightedPlane { weight: 1.0, plane: &a, domain: None }];
        let result = score(&inputs(criteria, &a, &a), &[true, true], &ScoreSettings::default());
        assert_eq!(result.zone_score, 0.01);
        assert!(!result.lcoe.is_nan());
    }

    #[test]
    fn test_fixed_and_identity_normalization() {
        let plane = [0.0, 50.0, 200.0];
        let mask = [true; 3];
        let fixed = normalize(&plane, &mask, NormalizationPolicy::Fixed, Some((0.0, 100.0)));
        assert_eq!(fixed, vec![0.0, 0.5, 1.0]);
        let identity = normalize(&plane, &mask, NormalizationPolicy::Identity, None);
        assert_eq!(identity, plane.to_vec());
        // No declared domain: min-max
        let fallback = normalize(&plane, &mask, NormalizationPolicy::Fixed, None);
        assert_eq!(fallback, vec![0.0, 0.25, 1.0]);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(NormalizationPolicy::from_str("FIXED"), NormalizationPolicy::Fixed);
        assert_eq!(NormalizationPolicy::from_str("identity"), NormalizationPolicy::Identity);
        assert_eq!(NormalizationPolicy::from_str("min-max"), NormalizationPolicy::MinMax);
        assert_eq!(NormalizationPolicy::MinMax.as_str(), "min_max");
    }
}
