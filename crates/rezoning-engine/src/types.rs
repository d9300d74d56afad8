//! Core types shared by the reader, evaluator and score calculator.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use rezoning_common::tile::{lat_to_mercator_row, mercator_row_to_lat};
use rezoning_common::{BoundingBox, Geometry, LcoeError, LcoeResult, TileCoord};

// ============================================================================
// Output grid
// ============================================================================

/// Row spacing of an output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    /// Rows evenly spaced in Web Mercator (map tiles).
    WebMercator,
    /// Rows evenly spaced in latitude (explicit polygons).
    Geographic,
}

/// Output pixel grid: every plane of an aligned array has this shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    /// Lon/lat extent of the grid edges.
    pub bbox: BoundingBox,
    pub kind: GridKind,
}

impl GridSpec {
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lon/lat of the center of pixel (col, row); row 0 is the north edge.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let fx = (col as f64 + 0.5) / self.width as f64;
        let fy = (row as f64 + 0.5) / self.height as f64;
        let lon = self.bbox.min_x + fx * self.bbox.width();
        let lat = match self.kind {
            GridKind::Geographic => self.bbox.max_y - fy * self.bbox.height(),
            GridKind::WebMercator => {
                let top = lat_to_mercator_row(self.bbox.max_y);
                let bottom = lat_to_mercator_row(self.bbox.min_y);
                mercator_row_to_lat(top + fy * (bottom - top))
            }
        };
        (lon, lat)
    }

    /// Pixel centers in row-major order.
    pub fn pixel_centers(&self) -> Vec<(f64, f64)> {
        let mut centers = Vec::with_capacity(self.len());
        for row in 0..self.height {
            for col in 0..self.width {
                centers.push(self.pixel_center(col, row));
            }
        }
        centers
    }
}

// ============================================================================
// Region
// ============================================================================

/// Shape of a request's area of interest.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionShape {
    Tile(TileCoord),
    Polygon(Geometry),
}

/// The geographic area of one request, with its output grid.
///
/// Pixel centers and the footprint mask are computed once at construction
/// and shared by every dataset read of the request.
#[derive(Debug, Clone)]
pub struct Region {
    shape: RegionShape,
    grid: GridSpec,
    /// Secondary polygon (country mask): pixels outside it are excluded.
    exclusion: Option<Geometry>,
    centers: Vec<(f64, f64)>,
    footprint: Vec<bool>,
}

impl Region {
    /// Region covering a map tile on a `tile_size` x `tile_size` Mercator grid.
    pub fn tile(tile: TileCoord, tile_size: usize, exclusion: Option<Geometry>) -> LcoeResult<Self> {
        if tile_size == 0 {
            return Err(LcoeError::invalid_parameter("tile_size", "must be > 0"));
        }
        let grid = GridSpec {
            width: tile_size,
            height: tile_size,
            bbox: tile.bounds(),
            kind: GridKind::WebMercator,
        };
        Ok(Self::build(RegionShape::Tile(tile), grid, exclusion))
    }

    /// Region covering an explicit polygon on a geographic grid whose longer
    /// side has `max_size` pixels.
    pub fn polygon(aoi: Geometry, max_size: usize, exclusion: Option<Geometry>) -> LcoeResult<Self> {
        if max_size == 0 {
            return Err(LcoeError::invalid_parameter("region_max_size", "must be > 0"));
        }
        let bbox = aoi.bbox();
        if !bbox.is_valid() {
            return Err(LcoeError::BadGeometry("area of interest has zero extent".to_string()));
        }
        let (width, height) = if bbox.width() >= bbox.height() {
            let h = (max_size as f64 * bbox.height() / bbox.width()).round() as usize;
            (max_size, h.max(1))
        } else {
            let w = (max_size as f64 * bbox.width() / bbox.height()).round() as usize;
            (w.max(1), max_size)
        };
        let grid = GridSpec {
            width,
            height,
            bbox,
            kind: GridKind::Geographic,
        };
        Ok(Self::build(RegionShape::Polygon(aoi), grid, exclusion))
    }

    fn build(shape: RegionShape, grid: GridSpec, exclusion: Option<Geometry>) -> Self {
        let centers = grid.pixel_centers();
        let footprint = centers
            .par_iter()
            .map(|&(lon, lat)| {
                let in_shape = match &shape {
                    // Every pixel center of a tile grid lies inside the tile.
                    RegionShape::Tile(_) => true,
                    RegionShape::Polygon(aoi) => aoi.contains_point(lon, lat),
                };
                in_shape
                    && exclusion
                        .as_ref()
                        .map_or(true, |g| g.contains_point(lon, lat))
            })
            .collect();
        Self {
            shape,
            grid,
            exclusion,
            centers,
            footprint,
        }
    }

    pub fn shape(&self) -> &RegionShape {
        &self.shape
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn exclusion(&self) -> Option<&Geometry> {
        self.exclusion.as_ref()
    }

    /// Lon/lat extent of the output grid.
    pub fn bbox(&self) -> BoundingBox {
        self.grid.bbox
    }

    /// Pixel centers, row-major.
    pub fn centers(&self) -> &[(f64, f64)] {
        &self.centers
    }

    /// True where a pixel is inside the shape and the exclusion polygon.
    pub fn footprint(&self) -> &[bool] {
        &self.footprint
    }

    /// Number of pixels inside the footprint.
    pub fn included_pixels(&self) -> usize {
        self.footprint.iter().filter(|&&f| f).count()
    }
}

// ============================================================================
// Layer index and arrays
// ============================================================================

/// Per-request ordered list of (dataset id, layer name) pairs: the meaning of
/// each position on the layer axis of an [`AlignedArray`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerIndex {
    entries: Vec<(String, String)>,
}

impl LayerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dataset: &str, layer: &str) {
        self.entries.push((dataset.to_string(), layer.to_string()));
    }

    /// Position of a layer on the layer axis.
    pub fn position(&self, layer: &str) -> Option<usize> {
        self.entries.iter().position(|(_, l)| l == layer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(d, l)| (d.as_str(), l.as_str()))
    }

    pub fn layers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, l)| l.as_str())
    }
}

/// One dataset read over a region: one plane per declared layer, no-data as NaN.
#[derive(Debug, Clone)]
pub struct DatasetArray {
    pub dataset: String,
    pub layers: Vec<String>,
    pub planes: Vec<Vec<f32>>,
}

impl DatasetArray {
    /// Per-layer no-data mask (true where the pixel has no value).
    pub fn nodata_mask(&self, layer: usize) -> Vec<bool> {
        self.planes
            .get(layer)
            .map(|p| p.iter().map(|v| v.is_nan()).collect())
            .unwrap_or_default()
    }
}

/// Co-registered stack of planes for one request.
#[derive(Debug, Clone)]
pub struct AlignedArray {
    pub grid: GridSpec,
    pub index: LayerIndex,
    pub planes: Vec<Vec<f32>>,
    pub footprint: Vec<bool>,
}

impl AlignedArray {
    /// Concatenate dataset arrays along the layer axis in the given order.
    pub fn concat(region: &Region, arrays: Vec<DatasetArray>) -> LcoeResult<Self> {
        let grid = *region.grid();
        let mut index = LayerIndex::new();
        let mut planes = Vec::new();
        for array in arrays {
            if array.layers.len() != array.planes.len() {
                return Err(LcoeError::dataset_read(
                    &array.dataset,
                    format!(
                        "{} planes returned for {} layers",
                        array.planes.len(),
                        array.layers.len()
                    ),
                ));
            }
            for (layer, plane) in array.layers.iter().zip(array.planes) {
                if plane.len() != grid.len() {
                    return Err(LcoeError::Internal(format!(
                        "plane '{}' has {} pixels, grid has {}",
                        layer,
                        plane.len(),
                        grid.len()
                    )));
                }
                index.push(&array.dataset, layer);
                planes.push(plane);
            }
        }
        Ok(Self {
            grid,
            index,
            planes,
            footprint: region.footprint().to_vec(),
        })
    }

    /// Plane of a layer, if it was read for this request.
    pub fn plane(&self, layer: &str) -> Option<&[f32]> {
        self.index.position(layer).map(|i| self.planes[i].as_slice())
    }

    pub fn layer_count(&self) -> usize {
        self.planes.len()
    }
}

/// Zone-level summary of a scoring request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneScore {
    pub lcoe: f64,
    pub zone_score: f64,
    pub zone_output: f64,
    pub zone_output_density: f64,
}
