//! Levelized cost of energy model.
//!
//! Costs are per MW of installed capacity; distances are read in metres and
//! priced per km. Every component is in USD/MWh.
//!
//! ```text
//! crf          = i(1+i)^n / ((1+i)^n - 1)
//! cf_eff       = cf (1 - tlf) (1 - uf)
//! generation   = (cg (1+decom) crf + omfg) / (cf_eff 8760) + omvg
//! transmission = (d_grid (ct crf + omft) + cs crf) / (cf_eff 8760)
//! road         = d_road (cr crf + omfr) / (cf_eff 50 8760)
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use rezoning_common::{LcoeError, LcoeResult};

use crate::registry::{LayerRegistry, LcoeComponent};

const HOURS_PER_YEAR: f64 = 8760.0;
/// Installed capacity served by one km of access road, in MW.
const ROAD_CAPACITY_MW: f64 = 50.0;

/// Cost parameters of a scoring request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcoeParams {
    /// Capacity-factor layer; defaults to the registry's first one.
    pub capacity_factor: Option<String>,
    /// Capital recovery factor; derived from `i` and `n` when unset.
    pub crf: Option<f64>,
    /// Economic discount rate.
    pub i: f64,
    /// Lifetime in years.
    pub n: f64,
    /// Generation capital, USD/MW.
    pub cg: f64,
    /// Generation fixed O&M, USD/MW/y.
    pub omfg: f64,
    /// Generation variable O&M, USD/MWh.
    pub omvg: f64,
    /// Transmission capital, USD/MW/km.
    pub ct: f64,
    /// Transmission fixed O&M, USD/MW/km/y.
    pub omft: f64,
    /// Substation capital, USD/MW.
    pub cs: f64,
    /// Road capital, USD/km.
    pub cr: f64,
    /// Road fixed O&M, USD/km/y.
    pub omfr: f64,
    /// Decommissioning cost as a fraction of generation capital.
    pub decom: f64,
    /// Technical loss factor.
    pub tlf: f64,
    /// Unavailability factor.
    pub uf: f64,
}

impl Default for LcoeParams {
    fn default() -> Self {
        Self {
            capacity_factor: None,
            crf: None,
            i: 0.1,
            n: 25.0,
            cg: 2_000_000.0,
            omfg: 30_000.0,
            omvg: 0.0,
            ct: 990.0,
            omft: 0.0,
            cs: 71_000.0,
            cr: 407_000.0,
            omfr: 0.0,
            decom: 0.0,
            tlf: 0.0,
            uf: 0.0,
        }
    }
}

impl LcoeParams {
    /// Capacity-factor layer to use, checked against the registry.
    pub fn capacity_factor_layer<'a>(&'a self, registry: &'a LayerRegistry) -> LcoeResult<&'a str> {
        match &self.capacity_factor {
            Some(layer) if registry.is_capacity_factor(layer) => Ok(layer.as_str()),
            Some(layer) => Err(LcoeError::invalid_parameter(
                "lcoe.capacity_factor",
                format!(
                    "'{}' is not one of {:?}",
                    layer,
                    registry.lcoe_layers().capacity_factors
                ),
            )),
            None => registry
                .lcoe_layers()
                .capacity_factors
                .first()
                .map(String::as_str)
                .ok_or_else(|| LcoeError::Config("no capacity factor layers".to_string())),
        }
    }

    pub fn validate(&self) -> LcoeResult<()> {
        let costs = [
            ("cg", self.cg),
            ("omfg", self.omfg),
            ("omvg", self.omvg),
            ("ct", self.ct),
            ("omft", self.omft),
            ("cs", self.cs),
            ("cr", self.cr),
            ("omfr", self.omfr),
            ("decom", self.decom),
        ];
        for (name, value) in costs {
            if !value.is_finite() || value < 0.0 {
                return Err(param_error(name, "must be a non-negative number"));
            }
        }
        for (name, value) in [("tlf", self.tlf), ("uf", self.uf)] {
            if !(0.0..1.0).contains(&value) {
                return Err(param_error(name, "must be in [0, 1)"));
            }
        }
        if !self.n.is_finite() || self.n <= 0.0 {
            return Err(param_error("n", "lifetime must be positive"));
        }
        if !self.i.is_finite() || self.i < 0.0 {
            return Err(param_error("i", "discount rate must be non-negative"));
        }
        if let Some(crf) = self.crf {
            if !crf.is_finite() || crf <= 0.0 {
                return Err(param_error("crf", "must be positive"));
            }
        }
        Ok(())
    }

    /// Capital recovery factor.
    pub fn crf(&self) -> f64 {
        if let Some(crf) = self.crf {
            return crf;
        }
        if self.i == 0.0 {
            return 1.0 / self.n;
        }
        let growth = (1.0 + self.i).powf(self.n);
        self.i * growth / (growth - 1.0)
    }

    fn effective_cf(&self, cf: f32) -> Option<f64> {
        let cf = cf as f64 * (1.0 - self.tlf) * (1.0 - self.uf);
        (cf.is_finite() && cf > 0.0).then_some(cf)
    }

    pub fn generation(&self, cf: f32) -> f64 {
        let crf = self.crf();
        match self.effective_cf(cf) {
            Some(cf) => {
                (self.cg * (1.0 + self.decom) * crf + self.omfg) / (cf * HOURS_PER_YEAR) + self.omvg
            }
            None => f64::NAN,
        }
    }

    pub fn transmission(&self, cf: f32, grid_distance_m: f32) -> f64 {
        let crf = self.crf();
        let km = grid_distance_m as f64 / 1000.0;
        match self.effective_cf(cf) {
            Some(cf) => (km * (self.ct * crf + self.omft) + self.cs * crf) / (cf * HOURS_PER_YEAR),
            None => f64::NAN,
        }
    }

    pub fn road(&self, cf: f32, road_distance_m: f32) -> f64 {
        let crf = self.crf();
        let km = road_distance_m as f64 / 1000.0;
        match self.effective_cf(cf) {
            Some(cf) => km * (self.cr * crf + self.omfr) / (cf * ROAD_CAPACITY_MW * HOURS_PER_YEAR),
            None => f64::NAN,
        }
    }
}

fn param_error(name: &str, message: &str) -> LcoeError {
    LcoeError::invalid_parameter(format!("lcoe.{}", name), message)
}

/// Per-pixel LCOE components. No-data inputs give `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct LcoePlanes {
    pub generation: Vec<f32>,
    pub transmission: Vec<f32>,
    pub road: Vec<f32>,
    pub total: Vec<f32>,
}

impl LcoePlanes {
    pub fn compute(params: &LcoeParams, cf: &[f32], grid_m: &[f32], road_m: &[f32]) -> Self {
        let per_pixel: Vec<(f32, f32, f32)> = cf
            .par_iter()
            .zip(grid_m.par_iter())
            .zip(road_m.par_iter())
            .map(|((&cf, &grid), &road)| {
                (
                    params.generation(cf) as f32,
                    params.transmission(cf, grid) as f32,
                    params.road(cf, road) as f32,
                )
            })
            .collect();

        let mut planes = Self {
            generation: Vec::with_capacity(per_pixel.len()),
            transmission: Vec::with_capacity(per_pixel.len()),
            road: Vec::with_capacity(per_pixel.len()),
            total: Vec::with_capacity(per_pixel.len()),
        };
        for (g, t, r) in per_pixel {
            planes.generation.push(g);
            planes.transmission.push(t);
            planes.road.push(r);
            planes.total.push(g + t + r);
        }
        planes
    }

    pub fn component(&self, component: LcoeComponent) -> &[f32] {
        match component {
            LcoeComponent::Generation => &self.generation,
            LcoeComponent::Transmission => &self.transmission,
            LcoeComponent::Road => &self.road,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crf() {
        let params = LcoeParams::default();
        // 10% over 25 years
        assert!((params.crf() - 0.110168).abs() < 1e-6);

        let zero_rate = LcoeParams {
            i: 0.0,
            n: 20.0,
            ..Default::default()
        };
        assert_eq!(zero_rate.crf(), 0.05);

        let fixed = LcoeParams {
            crf: Some(0.2),
            ..Default::default()
        };
        assert_eq!(fixed.crf(), 0.2);
    }

    #[test]
    fn test_components() {
        let params = LcoeParams {
            crf: Some(0.1),
            ..Default::default()
        };
        // (2e6 * 0.1 + 3e4) / (0.5 * 8760)
        let expected = 230_000.0 / 4380.0;
        assert!((params.generation(0.5) - expected).abs() < 1e-9);

        // (10 km * 99 + 7100) / 4380
        let expected = (10.0 * 99.0 + 7100.0) / 4380.0;
        assert!((params.transmission(0.5, 10_000.0) - expected).abs() < 1e-9);

        // 2 km * 40700 / (0.5 * 50 * 8760)
        let expected = 2.0 * 40_700.0 / (0.5 * 50.0 * 8760.0);
        assert!((params.road(0.5, 2_000.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_loss_factors_raise_cost() {
        let base = LcoeParams::default();
        let lossy = LcoeParams {
            tlf: 0.1,
            uf: 0.1,
            ..Default::default()
        };
        assert!(lossy.generation(0.3) > base.generation(0.3));
    }

    #[test]
    fn test_zero_or_nodata_cf_is_nan() {
        let params = LcoeParams::default();
        assert!(params.generation(0.0).is_nan());
        assert!(params.transmission(f32::NAN, 100.0).is_nan());
        assert!(params.road(0.3, f32::NAN).is_nan());
    }

    #[test]
    fn test_planes_total() {
        let params = LcoeParams::default();
        let planes = LcoePlanes::compute(&params, &[0.3, 0.0], &[1000.0, 1000.0], &[500.0, 500.0]);
        let expected = params.generation(0.3) + params.transmission(0.3, 1000.0) + params.road(0.3, 500.0);
        assert!((planes.total[0] as f64 - expected).abs() / expected < 1e-5);
        assert!(planes.total[1].is_nan());
        assert_eq!(planes.component(LcoeComponent::Road), planes.road.as_slice());
    }

    #[test]
    fn test_validate() {
        assert!(LcoeParams::default().validate().is_ok());
        let bad = LcoeParams {
            tlf: 1.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = LcoeParams {
            cg: -1.0,
            ..Default::default()
        };
        assert_eq!(bad.validate().unwrap_err().error_kind(), "invalid_parameter");
    }

    #[test]
    fn test_capacity_factor_layer() {
        let registry = LayerRegistry::builtin().unwrap();
        let params = LcoeParams::default();
        assert_eq!(params.capacity_factor_layer(&registry).unwrap(), "solar_cf");

        let wind = LcoeParams {
            capacity_factor: Some("wind_cf_100".into()),
            ..Default::default()
        };
        assert_eq!(wind.capacity_factor_layer(&registry).unwrap(), "wind_cf_100");

        let bad = LcoeParams {
            capacity_factor: Some("slope".into()),
            ..Default::default()
        };
        assert!(bad.capacity_factor_layer(&registry).is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let params: LcoeParams =
            serde_json::from_str(r#"{"capacity_factor": "wind_cf_100", "cg": 1500000}"#).unwrap();
        assert_eq!(params.cg, 1_500_000.0);
        assert_eq!(params.n, 25.0);
    }
}
