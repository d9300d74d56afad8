//! Alignment of decoded raster windows onto a region's output grid.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::Region;

use super::RasterWindow;

/// Resampling method used when sampling a source at output pixel centers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMethod {
    /// Value of the source pixel containing the center.
    #[default]
    Nearest,
    /// Weighted average of the four nearest source pixel centers.
    Bilinear,
}

impl ResamplingMethod {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "bilinear" | "linear" => Self::Bilinear,
            _ => Self::Nearest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
        }
    }
}

/// Nearest neighbor interpolation.
///
/// `x`/`y` are measured in pixel-center units: (0, 0) is the center of the
/// top-left pixel. Positions off the grid return NaN.
pub fn nearest_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < -0.5 || y < -0.5 {
        return f32::NAN;
    }

    let col = (x + 0.5).floor() as usize;
    let row = (y + 0.5).floor() as usize;

    if col >= width || row >= height {
        return f32::NAN;
    }

    data[row * width + col]
}

/// Bilinear interpolation.
///
/// Smoothly interpolates between the four nearest grid points. Within the
/// outer half pixel the edge row/column is repeated.
pub fn bilinear_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if width == 0 || height == 0 {
        return f32::NAN;
    }
    if x < -0.5 || y < -0.5 || x > width as f64 - 0.5 || y > height as f64 - 0.5 {
        return f32::NAN;
    }

    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = (x - x0 as f64) as f32;
    let yf = (y - y0 as f64) as f32;

    let v00 = data[y0 * width + x0];
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    // Any no-data corner makes the sample no-data
    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Sample every band of `raster` at the region's pixel centers.
///
/// Returns one plane per band with the region grid's shape. Pixels outside
/// the region footprint, outside the raster, or on no-data are NaN.
pub fn align_window(raster: &RasterWindow, region: &Region, method: ResamplingMethod) -> Vec<Vec<f32>> {
    let window = raster.window;
    let transform = raster.transform;

    // Source position of every output pixel, shared by all bands
    let positions: Vec<Option<(f64, f64)>> = region
        .centers()
        .par_iter()
        .zip(region.footprint().par_iter())
        .map(|(&(lon, lat), &inside)| {
            if !inside {
                return None;
            }
            let (fx, fy) = transform.to_pixel(lon, lat);
            Some((
                fx - 0.5 - window.x_off as f64,
                fy - 0.5 - window.y_off as f64,
            ))
        })
        .collect();

    raster
        .bands
        .iter()
        .map(|band| {
            positions
                .par_iter()
                .map(|pos| match pos {
                    None => f32::NAN,
                    Some((x, y)) => match method {
                        ResamplingMethod::Nearest => {
                            nearest_interpolate(band, window.width, window.height, *x, *y)
                        }
                        ResamplingMethod::Bilinear => {
                            bilinear_interpolate(band, window.width, window.height, *x, *y)
                        }
                    },
                })
                .collect()
        })
        .collect()
}
