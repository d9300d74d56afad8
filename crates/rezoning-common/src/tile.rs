//! XYZ tile addressing in the Web Mercator tiling scheme.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::{BoundingBox, LcoeError, LcoeResult, Polygon};

/// Deepest zoom level accepted in a tile address.
pub const MAX_ZOOM: u32 = 24;

/// Latitude limit of the Web Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// A tile coordinate (z/x/y), XYZ convention with top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    /// Create a tile coordinate, rejecting addresses outside the tile matrix.
    pub fn new(z: u32, x: u32, y: u32) -> LcoeResult<Self> {
        if z > MAX_ZOOM {
            return Err(LcoeError::InvalidTile(format!(
                "zoom {} exceeds maximum {}",
                z, MAX_ZOOM
            )));
        }
        let n = 1u64 << z;
        if x as u64 >= n || y as u64 >= n {
            return Err(LcoeError::InvalidTile(format!(
                "{}/{}/{} is outside the {}x{} tile matrix",
                z, x, y, n, n
            )));
        }
        Ok(Self { z, x, y })
    }

    /// Parse path segments; the row may carry an image extension ("12.png").
    pub fn parse(z: &str, x: &str, y: &str) -> LcoeResult<Self> {
        let y = y.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(y);
        let parse = |name: &str, value: &str| {
            value.parse::<u32>().map_err(|_| {
                LcoeError::InvalidTile(format!("{} must be a non-negative integer, got '{}'", name, value))
            })
        };
        Self::new(parse("z", z)?, parse("x", x)?, parse("y", y)?)
    }

    /// Number of tiles along each axis at this zoom.
    pub fn matrix_size(&self) -> f64 {
        (1u64 << self.z) as f64
    }

    /// Geographic bounds of the tile.
    pub fn bounds(&self) -> BoundingBox {
        tile_to_latlon_bounds(self)
    }

    /// Tile footprint as a closed lon/lat polygon ring.
    pub fn footprint(&self) -> Polygon {
        let b = self.bounds();
        Polygon::new(vec![
            (b.min_x, b.min_y),
            (b.max_x, b.min_y),
            (b.max_x, b.max_y),
            (b.min_x, b.max_y),
            (b.min_x, b.min_y),
        ])
    }

    /// Longitude/latitude of a fractional position inside the tile, where
    /// (0, 0) is the top-left corner and (1, 1) the bottom-right corner.
    pub fn position_to_lonlat(&self, fx: f64, fy: f64) -> (f64, f64) {
        let n = self.matrix_size();
        let lon = (self.x as f64 + fx) / n * 360.0 - 180.0;
        let lat = mercator_row_to_lat((self.y as f64 + fy) / n);
        (lon, lat)
    }
}

/// Latitude for a normalized Mercator row (0 = north edge, 1 = south edge).
pub fn mercator_row_to_lat(t: f64) -> f64 {
    (PI * (1.0 - 2.0 * t)).sinh().atan().to_degrees()
}

/// Normalized Mercator row for a latitude.
pub fn lat_to_mercator_row(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    (1.0 - lat.tan().asinh() / PI) / 2.0
}

/// Convert lat/lon to Web Mercator tile coordinates.
pub fn latlon_to_tile(lat: f64, lon: f64, zoom: u32) -> TileCoord {
    let n = (1u64 << zoom) as f64;
    let max_index = n - 1.0;

    let x = ((lon + 180.0) / 360.0 * n).floor().clamp(0.0, max_index) as u32;
    let y = (lat_to_mercator_row(lat) * n).floor().clamp(0.0, max_index) as u32;

    TileCoord { z: zoom, x, y }
}

/// Convert Web Mercator tile coordinates to lat/lon bounds.
pub fn tile_to_latlon_bounds(coord: &TileCoord) -> BoundingBox {
    let n = coord.matrix_size();

    let lon_min = coord.x as f64 / n * 360.0 - 180.0;
    let lon_max = (coord.x + 1) as f64 / n * 360.0 - 180.0;

    let lat_max = mercator_row_to_lat(coord.y as f64 / n);
    let lat_min = mercator_row_to_lat((coord.y + 1) as f64 / n);

    BoundingBox::new(lon_min, lat_min, lon_max, lat_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_tile_bounds() {
        let bbox = TileCoord::new(0, 0, 0).unwrap().bounds();
        assert!((bbox.min_x + 180.0).abs() < 1e-9);
        assert!((bbox.max_x - 180.0).abs() < 1e-9);
        assert!((bbox.max_y - MAX_MERCATOR_LAT).abs() < 1e-6);
        assert!((bbox.min_y + MAX_MERCATOR_LAT).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_out_of_matrix() {
        assert!(matches!(TileCoord::new(2, 4, 0), Err(LcoeError::InvalidTile(_))));
        assert!(matches!(TileCoord::new(2, 0, 4), Err(LcoeError::InvalidTile(_))));
        assert!(matches!(TileCoord::new(MAX_ZOOM + 1, 0, 0), Err(LcoeError::InvalidTile(_))));
        assert!(TileCoord::new(2, 3, 3).is_ok());
    }

    #[test]
    fn test_parse_strips_extension() {
        let tile = TileCoord::parse("5", "10", "12.png").unwrap();
        assert_eq!(tile, TileCoord { z: 5, x: 10, y: 12 });
        assert!(TileCoord::parse("5", "-1", "12").is_err());
        assert!(TileCoord::parse("five", "1", "1").is_err());
    }

    #[test]
    fn test_latlon_round_trip_contains_point() {
        let tile = latlon_to_tile(34.5, 69.2, 8);
        assert!(tile.bounds().contains_point(69.2, 34.5));
    }

    #[test]
    fn test_footprint_is_closed_ring() {
        let footprint = TileCoord::new(3, 2, 1).unwrap().footprint();
        let ring = footprint.exterior();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_position_to_lonlat_corners() {
        let tile = TileCoord::new(1, 1, 0).unwrap();
        let (lon, lat) = tile.position_to_lonlat(0.0, 1.0);
        assert!((lon - 0.0).abs() < 1e-9);
        assert!(lat.abs() < 1e-9);
    }
}
