//! Georeferenced pixel windows.

use rezoning_common::BoundingBox;

use super::{RasterError, RasterResult};

/// Affine mapping from pixel edges to lon/lat, without rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// Longitude of the left edge of column 0.
    pub origin_x: f64,
    /// Latitude of the top edge of row 0.
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// North-up transform covering `bbox` with `width` x `height` pixels.
    pub fn from_bbox(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self::new(
            bbox.min_x,
            bbox.max_y,
            bbox.width() / width as f64,
            -bbox.height() / height as f64,
        )
    }

    /// Parse GDAL's six coefficients `[x0, dx, rx, y0, ry, dy]`.
    pub fn from_gdal(coeffs: &[f64]) -> RasterResult<Self> {
        if coeffs.len() != 6 {
            return Err(RasterError::Malformed(format!(
                "geotransform needs 6 coefficients, got {}",
                coeffs.len()
            )));
        }
        if coeffs[2] != 0.0 || coeffs[4] != 0.0 {
            return Err(RasterError::Unsupported(
                "rotated geotransforms are not supported".to_string(),
            ));
        }
        let transform = Self::new(coeffs[0], coeffs[3], coeffs[1], coeffs[5]);
        transform.validate()?;
        Ok(transform)
    }

    pub fn validate(&self) -> RasterResult<()> {
        let finite = [
            self.origin_x,
            self.origin_y,
            self.pixel_width,
            self.pixel_height,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite || self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return Err(RasterError::Malformed(format!(
                "degenerate geotransform {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Fractional pixel position measured from pixel edges.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Smallest pixel window of a `width` x `height` raster covering `bbox`,
    /// padded by one pixel for interpolation. `None` when they do not overlap.
    pub fn window_for(&self, bbox: &BoundingBox, width: usize, height: usize) -> Option<PixelWindow> {
        let (c0, r0) = self.to_pixel(bbox.min_x, bbox.max_y);
        let (c1, r1) = self.to_pixel(bbox.max_x, bbox.min_y);

        let span = |a: f64, b: f64, limit: usize| -> Option<(usize, usize)> {
            let lo = (a.min(b).floor() - 1.0).max(0.0);
            let hi = (a.max(b).ceil() + 1.0).min(limit as f64);
            (hi > lo).then(|| (lo as usize, hi as usize))
        };

        let (x0, x1) = span(c0, c1, width)?;
        let (y0, y1) = span(r0, r1, height)?;
        Some(PixelWindow::new(x0, y0, x1 - x0, y1 - y0))
    }
}

/// Rectangle of pixels in a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub x_off: usize,
    pub y_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(x_off: usize, y_off: usize, width: usize, height: usize) -> Self {
        Self {
            x_off,
            y_off,
            width,
            height,
        }
    }

    /// Window covering a whole raster.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn empty() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn x_end(&self) -> usize {
        self.x_off + self.width
    }

    pub fn y_end(&self) -> usize {
        self.y_off + self.height
    }

    pub fn intersect(&self, other: &PixelWindow) -> Option<PixelWindow> {
        let x0 = self.x_off.max(other.x_off);
        let y0 = self.y_off.max(other.y_off);
        let x1 = self.x_end().min(other.x_end());
        let y1 = self.y_end().min(other.y_end());
        (x1 > x0 && y1 > y0).then(|| PixelWindow::new(x0, y0, x1 - x0, y1 - y0))
    }
}

/// Decoded pixels of a window of a georeferenced raster, one row-major
/// `Vec<f32>` per band, no-data already replaced by `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterWindow {
    /// Transform of the full raster the window was cut from.
    pub transform: GeoTransform,
    pub window: PixelWindow,
    pub bands: Vec<Vec<f32>>,
}

impl RasterWindow {
    /// A raster held entirely in memory.
    pub fn full(transform: GeoTransform, width: usize, height: usize, bands: Vec<Vec<f32>>) -> Self {
        Self {
            transform,
            window: PixelWindow::full(width, height),
            bands,
        }
    }

    /// Window with no pixels: every sample is no-data.
    pub fn empty(transform: GeoTransform, bands: usize) -> Self {
        Self {
            transform,
            window: PixelWindow::empty(),
            bands: vec![Vec::new(); bands],
        }
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Replace each band's sentinel (if any) with `NaN`.
    pub fn mask_sentinels(&mut self, sentinels: &[Option<f32>]) {
        for (band, sentinel) in self.bands.iter_mut().zip(sentinels) {
            if let Some(nodata) = *sentinel {
                for v in band.iter_mut().filter(|v| **v == nodata) {
                    *v = f32::NAN;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_gdal_rejects_rotation() {
        assert!(GeoTransform::from_gdal(&[0.0, 1.0, 0.5, 10.0, 0.0, -1.0]).is_err());
        assert!(GeoTransform::from_gdal(&[0.0, 1.0, 0.0, 10.0]).is_err());
        assert!(GeoTransform::from_gdal(&[0.0, 0.0, 0.0, 10.0, 0.0, -1.0]).is_err());
        let t = GeoTransform::from_gdal(&[-180.0, 0.5, 0.0, 90.0, 0.0, -0.5]).unwrap();
        assert_eq!(t.to_pixel(-179.75, 89.75), (0.5, 0.5));
    }

    #[test]
    fn test_window_for_is_padded_and_clipped() {
        let t = GeoTransform::new(0.0, 10.0, 1.0, -1.0);
        let bbox = BoundingBox::new(2.2, 3.5, 4.8, 6.1);
        let w = t.window_for(&bbox, 10, 10).unwrap();
        // cols 2.2..4.8 -> 1..6, rows 3.9..6.5 -> 2..8
        assert_eq!(w, PixelWindow::new(1, 2, 5, 6));

        let edge = BoundingBox::new(-5.0, 8.0, 0.5, 12.0);
        let w = t.window_for(&edge, 10, 10).unwrap();
        assert_eq!((w.x_off, w.y_off), (0, 0));

        let outside = BoundingBox::new(20.0, 0.0, 30.0, 5.0);
        assert!(t.window_for(&outside, 10, 10).is_none());
    }

    #[test]
    fn test_intersect() {
        let a = PixelWindow::new(0, 0, 10, 10);
        let b = PixelWindow::new(5, 8, 10, 10);
        assert_eq!(a.intersect(&b), Some(PixelWindow::new(5, 8, 5, 2)));
        let c = PixelWindow::new(10, 0, 2, 2);
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_mask_sentinels_per_band() {
        let mut raster = RasterWindow::full(
            GeoTransform::new(0.0, 1.0, 1.0, -1.0),
            2,
            1,
            vec![vec![5.0, -9999.0], vec![-9999.0, 0.0]],
        );
        raster.mask_sentinels(&[Some(-9999.0), None]);
        assert_eq!(raster.bands[0][0], 5.0);
        assert!(raster.bands[0][1].is_nan());
        // no sentinel declared for the second band
        assert_eq!(raster.bands[1], vec![-9999.0, 0.0]);
    }
}
