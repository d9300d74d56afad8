//! Tile color compositor.
//!
//! A filter tile is a value plane (0.0/1.0 for the filter mask) and a
//! mask. Each pixel becomes
//!
//! ```text
//! R = v * r    G = v * g    B = v * b    A = v * a * mask
//! ```
//!
//! so included pixels carry the requested color and everything else is
//! fully transparent black.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::png::create_png_auto;
use crate::{RenderError, RenderResult};

/// Pixel count above which compositing runs in parallel.
const PARALLEL_THRESHOLD: usize = 4096;

/// An RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `"R,G,B,A"`. Anything other than four integers 0-255 is rejected.
    pub fn parse(s: &str) -> RenderResult<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(RenderError::InvalidColor(s.to_string()));
        }
        let mut channels = [0u8; 4];
        for (channel, part) in channels.iter_mut().zip(&parts) {
            *channel = part
                .parse::<u8>()
                .map_err(|_| RenderError::InvalidColor(s.to_string()))?;
        }
        let [r, g, b, a] = channels;
        Ok(Self { r, g, b, a })
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    /// Default filter tile color.
    fn default() -> Self {
        Self::new(45, 39, 88, 178)
    }
}

impl FromStr for Rgba {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.r, self.g, self.b, self.a)
    }
}

#[inline]
fn scale(value: f32, channel: u8) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * channel as f32).round() as u8
}

#[inline]
fn pixel(value: f32, included: bool, color: Rgba) -> [u8; 4] {
    [
        scale(value, color.r),
        scale(value, color.g),
        scale(value, color.b),
        if included { scale(value, color.a) } else { 0 },
    ]
}

/// Interleaved RGBA bytes (band order R, G, B, A) for `values` under `mask`.
///
/// `values` and `mask` must have the same length.
pub fn composite(values: &[f32], mask: &[bool], color: Rgba) -> Vec<u8> {
    debug_assert_eq!(values.len(), mask.len());
    let mut out = vec![0u8; values.len() * 4];

    if values.len() >= PARALLEL_THRESHOLD {
        out.par_chunks_exact_mut(4)
            .zip(values.par_iter().zip(mask.par_iter()))
            .for_each(|(px, (&v, &m))| px.copy_from_slice(&pixel(v, m, color)));
    } else {
        for (px, (&v, &m)) in out.chunks_exact_mut(4).zip(values.iter().zip(mask)) {
            px.copy_from_slice(&pixel(v, m, color));
        }
    }
    out
}

/// Composite and encode a `width` x `height` tile as PNG.
pub fn render_tile(
    values: &[f32],
    mask: &[bool],
    color: Rgba,
    width: usize,
    height: usize,
) -> RenderResult<Vec<u8>> {
    let expected = width * height;
    if values.len() != expected || mask.len() != expected {
        return Err(RenderError::SizeMismatch {
            width,
            height,
            expected,
            actual: values.len().min(mask.len()),
        });
    }
    let pixels = composite(values, mask, color);
    create_png_auto(&pixels, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_included_pixel_takes_color() {
        let color = Rgba::parse("45,39,88,178").unwrap();
        let out = composite(&[1.0, 0.0], &[true, false], color);
        assert_eq!(&out[0..4], &[45, 39, 88, 178]);
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_value_without_mask_is_transparent() {
        let out = composite(&[1.0], &[false], Rgba::default());
        assert_eq!(out[3], 0);
    }

    #[test]
    fn test_nan_value_is_transparent_black() {
        let out = composite(&[f32::NAN], &[true], Rgba::default());
        assert_eq!(out, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let n = PARALLEL_THRESHOLD + 3;
        let values: Vec<f32> = (0..n).map(|i| (i % 2) as f32).collect();
        let mask: Vec<bool> = (0..n).map(|i| i % 3 != 0).collect();
        let out = composite(&values, &mask, Rgba::new(10, 20, 30, 40));
        for i in 0..n {
            let expected = pixel(values[i], mask[i], Rgba::new(10, 20, 30, 40));
            assert_eq!(&out[i * 4..i * 4 + 4], &expected);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "1,2,3", "1,2,3,4,5", "256,0,0,0", "-1,0,0,0", "a,b,c,d", "1.5,2,3,4"] {
            assert!(Rgba::parse(bad).is_err(), "{}", bad);
        }
        assert_eq!(Rgba::parse(" 1, 2 ,3,4").unwrap(), Rgba::new(1, 2, 3, 4));
        assert_eq!(Rgba::default().to_string(), "45,39,88,178");
    }

    #[test]
    fn test_render_tile_checks_size() {
        let err = render_tile(&[1.0; 3], &[true; 3], Rgba::default(), 2, 2).unwrap_err();
        assert!(matches!(err, RenderError::SizeMismatch { expected: 4, .. }));
    }
}
