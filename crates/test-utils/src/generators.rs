//! Synthetic planes and geometries for rezoning tests.
//!
//! Planes are row-major `Vec<f32>`, no-data encoded as NaN.

/// Plane where each pixel holds its own index.
///
/// ```
/// use test_utils::ramp_plane;
///
/// let plane = ramp_plane(3, 2);
/// assert_eq!(plane, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
/// ```
pub fn ramp_plane(width: usize, height: usize) -> Vec<f32> {
    (0..width * height).map(|i| i as f32).collect()
}

/// Plane with a single value.
pub fn constant_plane(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Plane increasing linearly from `min` at the west edge to `max` at the
/// east edge, constant along each column.
pub fn gradient_plane(width: usize, height: usize, min: f32, max: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for _row in 0..height {
        for col in 0..width {
            let t = if width > 1 {
                col as f32 / (width - 1) as f32
            } else {
                0.0
            };
            data.push(min + t * (max - min));
        }
    }
    data
}

/// Exclusion-style plane: 1.0 inside the given column range, 0.0 elsewhere.
pub fn flag_columns(width: usize, height: usize, cols: std::ops::Range<usize>) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for _row in 0..height {
        for col in 0..width {
            data.push(if cols.contains(&col) { 1.0 } else { 0.0 });
        }
    }
    data
}

/// Copy of `plane` with every `stride`-th pixel replaced by NaN.
pub fn with_nan_every(plane: &[f32], stride: usize) -> Vec<f32> {
    plane
        .iter()
        .enumerate()
        .map(|(i, &v)| if stride > 0 && i % stride == 0 { f32::NAN } else { v })
        .collect()
}

/// Closed ring of an axis-aligned rectangle, counter-clockwise.
pub fn rect_ring(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<(f64, f64)> {
    vec![
        (min_x, min_y),
        (max_x, min_y),
        (max_x, max_y),
        (min_x, max_y),
        (min_x, min_y),
    ]
}

/// GeoJSON Polygon geometry of an axis-aligned rectangle.
pub fn rect_geojson(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> serde_json::Value {
    let ring: Vec<[f64; 2]> = rect_ring(min_x, min_y, max_x, max_y)
        .into_iter()
        .map(|(x, y)| [x, y])
        .collect();
    serde_json::json!({
        "type": "Polygon",
        "coordinates": [ring],
    })
}
