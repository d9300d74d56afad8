//! Shared test utilities for the rezoning workspace.
//!
//! This crate provides common testing infrastructure including:
//! - In-memory GeoTIFF encoding for reader fixtures
//! - Synthetic plane generators
//! - Country boundary and statistics fixtures
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{GeoTiffBuilder, ramp_plane};
//! ```

pub mod fixtures;
pub mod generators;
pub mod geotiff;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use geotiff::GeoTiffBuilder;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Asserts two planes are equal, treating NaN as equal to NaN.
///
/// ```ignore
/// use test_utils::assert_planes_eq;
///
/// assert_planes_eq!(&[1.0, f32::NAN], &[1.0, f32::NAN]);
/// ```
#[macro_export]
macro_rules! assert_planes_eq {
    ($left:expr, $right:expr) => {{
        let left: &[f32] = $left;
        let right: &[f32] = $right;
        assert_eq!(left.len(), right.len(), "plane lengths differ");
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            let same = (l.is_nan() && r.is_nan()) || l == r;
            if !same {
                panic!(
                    "assertion failed: planes differ at pixel {}\n  left: `{:?}`,\n right: `{:?}`",
                    i, l, r
                );
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    fn test_assert_planes_eq_nan() {
        assert_planes_eq!(&[1.0, f32::NAN], &[1.0, f32::NAN]);
    }

    #[test]
    #[should_panic(expected = "planes differ at pixel 1")]
    fn test_assert_planes_eq_fails() {
        assert_planes_eq!(&[1.0, 2.0], &[1.0, f32::NAN]);
    }
}
