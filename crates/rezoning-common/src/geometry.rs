//! Polygon geometry with GeoJSON (de)serialization.
//!
//! Only areal geometries are modelled: an area of interest or a country mask is
//! either a `Polygon` or a `MultiPolygon`. Anything else is rejected as
//! [`LcoeError::BadGeometry`] before a dataset is touched.

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, LcoeError, LcoeResult};

/// A polygon: one exterior ring followed by zero or more holes, lon/lat pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    rings: Vec<Vec<(f64, f64)>>,
    bbox: BoundingBox,
}

impl Polygon {
    /// Polygon without holes. The ring is not validated; use [`Polygon::with_holes`]
    /// or GeoJSON parsing for untrusted input.
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self::from_rings(vec![exterior])
    }

    fn from_rings(rings: Vec<Vec<(f64, f64)>>) -> Self {
        let bbox = BoundingBox::from_points(rings[0].iter().copied())
            .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, 0.0, 0.0));
        Self { rings, bbox }
    }

    /// Polygon from an exterior ring and holes, validating every ring.
    pub fn with_holes(exterior: Vec<(f64, f64)>, holes: Vec<Vec<(f64, f64)>>) -> LcoeResult<Self> {
        let mut rings = Vec::with_capacity(1 + holes.len());
        rings.push(exterior);
        rings.extend(holes);
        for ring in &rings {
            validate_ring(ring)?;
        }
        Ok(Self::from_rings(rings))
    }

    pub fn exterior(&self) -> &[(f64, f64)] {
        &self.rings[0]
    }

    pub fn holes(&self) -> &[Vec<(f64, f64)>] {
        &self.rings[1..]
    }

    /// Bounding box of the exterior ring.
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Even-odd point-in-polygon test over all rings, so holes are excluded.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        if !self.bbox.contains_point(lon, lat) {
            return false;
        }
        self.rings
            .iter()
            .filter(|ring| ring_crosses(ring, lon, lat))
            .count()
            % 2
            == 1
    }
}

/// Ray-casting crossing test for a single ring.
fn ring_crosses(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];

        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

fn validate_ring(ring: &[(f64, f64)]) -> LcoeResult<()> {
    if ring.len() < 4 {
        return Err(LcoeError::BadGeometry(
            "polygon ring must have at least 4 positions (including closing position)".to_string(),
        ));
    }
    for &(lon, lat) in ring {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(LcoeError::BadGeometry("non-finite coordinate".to_string()));
        }
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(LcoeError::BadGeometry(format!(
                "coordinate ({}, {}) is outside lon/lat range",
                lon, lat
            )));
        }
    }
    if ring.first() != ring.last() {
        return Err(LcoeError::BadGeometry("polygon ring is not closed".to_string()));
    }
    let bbox = BoundingBox::from_points(ring.iter().copied());
    if !bbox.map(|b| b.is_valid()).unwrap_or(false) {
        return Err(LcoeError::BadGeometry("polygon ring has zero area".to_string()));
    }
    Ok(())
}

/// An areal geometry: the shape of an AOI or a country boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonGeometry", into = "GeoJsonGeometry")]
pub enum Geometry {
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Geometry::Polygon(p) => std::slice::from_ref(p),
            Geometry::MultiPolygon(ps) => ps,
        }
    }

    /// Bounding box enclosing every member polygon.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_points(
            self.polygons()
                .iter()
                .flat_map(|p| p.exterior().iter().copied()),
        )
        .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Union semantics: inside when inside any member polygon.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        self.polygons().iter().any(|p| p.contains_point(lon, lat))
    }

    /// Parse a GeoJSON geometry, Feature, or FeatureCollection (first feature).
    pub fn from_geojson_value(value: &serde_json::Value) -> LcoeResult<Self> {
        let kind = value.get("type").and_then(|t| t.as_str()).unwrap_or("");
        match kind {
            "Feature" => {
                let geometry = value
                    .get("geometry")
                    .ok_or_else(|| LcoeError::BadGeometry("feature has no geometry".to_string()))?;
                Self::from_geojson_value(geometry)
            }
            "FeatureCollection" => {
                let first = value
                    .get("features")
                    .and_then(|f| f.as_array())
                    .and_then(|f| f.first())
                    .ok_or_else(|| {
                        LcoeError::BadGeometry("feature collection is empty".to_string())
                    })?;
                Self::from_geojson_value(first)
            }
            _ => serde_json::from_value(value.clone())
                .map_err(|e| LcoeError::BadGeometry(e.to_string())),
        }
    }
}

impl From<Polygon> for Geometry {
    fn from(polygon: Polygon) -> Self {
        Geometry::Polygon(polygon)
    }
}

/// GeoJSON wire representation. Positions may carry a third (elevation) value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
}

fn rings_to_polygon(rings: Vec<Vec<Vec<f64>>>) -> LcoeResult<Polygon> {
    let mut converted = Vec::with_capacity(rings.len());
    for ring in rings {
        let mut points = Vec::with_capacity(ring.len());
        for position in ring {
            if position.len() < 2 {
                return Err(LcoeError::BadGeometry(
                    "position must have at least two values".to_string(),
                ));
            }
            points.push((position[0], position[1]));
        }
        converted.push(points);
    }
    let mut rings = converted.into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| LcoeError::BadGeometry("polygon has no rings".to_string()))?;
    Polygon::with_holes(exterior, rings.collect())
}

fn polygon_to_rings(polygon: &Polygon) -> Vec<Vec<Vec<f64>>> {
    polygon
        .rings
        .iter()
        .map(|ring| ring.iter().map(|&(x, y)| vec![x, y]).collect())
        .collect()
}

impl TryFrom<GeoJsonGeometry> for Geometry {
    type Error = LcoeError;

    fn try_from(value: GeoJsonGeometry) -> Result<Self, Self::Error> {
        match value {
            GeoJsonGeometry::Polygon { coordinates } => {
                Ok(Geometry::Polygon(rings_to_polygon(coordinates)?))
            }
            GeoJsonGeometry::MultiPolygon { coordinates } => {
                if coordinates.is_empty() {
                    return Err(LcoeError::BadGeometry("multipolygon is empty".to_string()));
                }
                let polygons = coordinates
                    .into_iter()
                    .map(rings_to_polygon)
                    .collect::<LcoeResult<Vec<_>>>()?;
                Ok(Geometry::MultiPolygon(polygons))
            }
        }
    }
}

impl From<Geometry> for GeoJsonGeometry {
    fn from(value: Geometry) -> Self {
        match value {
            Geometry::Polygon(p) => GeoJsonGeometry::Polygon {
                coordinates: polygon_to_rings(&p),
            },
            Geometry::MultiPolygon(ps) => GeoJsonGeometry::MultiPolygon {
                coordinates: ps.iter().map(polygon_to_rings).collect(),
            },
        }
    }
}
