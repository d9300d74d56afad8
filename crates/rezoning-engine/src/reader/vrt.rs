//! GDAL VRT mosaics.
//!
//! A mosaic dataset is a `.vrt` XML file listing GeoTIFF tiles. Each band is
//! composited from its sources in declaration order; later sources paint over
//! earlier ones where they have data.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rezoning_common::BoundingBox;

use super::cache::{CacheWeight, ChunkCache};
use super::geotiff::GeoTiffFile;
use super::{GeoTransform, PixelWindow, RasterError, RasterResult, RasterWindow};

// ============================================================================
// XML structure
// ============================================================================

#[derive(Debug, Deserialize)]
struct XmlDataset {
    #[serde(rename = "@rasterXSize")]
    raster_x_size: usize,
    #[serde(rename = "@rasterYSize")]
    raster_y_size: usize,
    #[serde(rename = "GeoTransform")]
    geo_transform: String,
    #[serde(rename = "VRTRasterBand", default)]
    bands: Vec<XmlBand>,
}

#[derive(Debug, Deserialize)]
struct XmlBand {
    #[serde(rename = "@band")]
    band: Option<usize>,
    #[serde(rename = "NoDataValue")]
    nodata: Option<String>,
    #[serde(rename = "SimpleSource", default)]
    simple: Vec<XmlSource>,
    #[serde(rename = "ComplexSource", default)]
    complex: Vec<XmlSource>,
}

#[derive(Debug, Deserialize)]
struct XmlSource {
    #[serde(rename = "SourceFilename")]
    filename: XmlFilename,
    #[serde(rename = "SourceBand")]
    band: Option<usize>,
    #[serde(rename = "SrcRect")]
    src_rect: Option<XmlRect>,
    #[serde(rename = "DstRect")]
    dst_rect: Option<XmlRect>,
    #[serde(rename = "NODATA")]
    nodata: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlFilename {
    #[serde(rename = "@relativeToVRT")]
    relative_to_vrt: Option<String>,
    #[serde(rename = "$text")]
    path: String,
}

#[derive(Debug, Deserialize)]
struct XmlRect {
    #[serde(rename = "@xOff")]
    x_off: f64,
    #[serde(rename = "@yOff")]
    y_off: f64,
    #[serde(rename = "@xSize")]
    x_size: f64,
    #[serde(rename = "@ySize")]
    y_size: f64,
}

impl From<XmlRect> for VrtRect {
    fn from(r: XmlRect) -> Self {
        VrtRect {
            x_off: r.x_off,
            y_off: r.y_off,
            x_size: r.x_size,
            y_size: r.y_size,
        }
    }
}

// ============================================================================
// Mosaic model
// ============================================================================

/// Pixel rectangle of a VRT source, in source or mosaic pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VrtRect {
    pub x_off: f64,
    pub y_off: f64,
    pub x_size: f64,
    pub y_size: f64,
}

/// One tile contributing to a mosaic band.
#[derive(Debug, Clone, PartialEq)]
pub struct VrtSource {
    /// Storage key of the source GeoTIFF.
    pub path: String,
    /// 0-based band of the source file.
    pub band: usize,
    /// Defaults to the whole source raster.
    pub src_rect: Option<VrtRect>,
    /// Defaults to `src_rect`.
    pub dst_rect: Option<VrtRect>,
    pub nodata: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VrtBand {
    pub nodata: Option<f64>,
    pub sources: Vec<VrtSource>,
}

/// A parsed VRT mosaic.
#[derive(Debug, Clone, PartialEq)]
pub struct VrtDataset {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub bands: Vec<VrtBand>,
}

impl CacheWeight for VrtDataset {
    fn weight(&self) -> usize {
        let sources: usize = self.bands.iter().map(|b| b.sources.len()).sum();
        std::mem::size_of::<Self>() + sources * std::mem::size_of::<VrtSource>() * 2
    }
}

impl VrtDataset {
    /// Parse VRT XML stored at `vrt_path`. Source paths are resolved to
    /// storage keys relative to the same store.
    pub fn parse(xml: &str, vrt_path: &str) -> RasterResult<Self> {
        let doc: XmlDataset = quick_xml::de::from_str(xml)?;

        let coeffs = doc
            .geo_transform
            .split(',')
            .map(|c| c.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RasterError::Malformed(format!("bad GeoTransform: {}", e)))?;
        let transform = GeoTransform::from_gdal(&coeffs)?;

        let mut bands: Vec<(usize, VrtBand)> = Vec::with_capacity(doc.bands.len());
        for (i, band) in doc.bands.into_iter().enumerate() {
            let number = band.band.unwrap_or(i + 1);
            let sources = band
                .simple
                .into_iter()
                .chain(band.complex)
                .map(|s| {
                    Ok(VrtSource {
                        path: resolve_source_path(
                            &s.filename.path,
                            s.filename.relative_to_vrt.as_deref() == Some("1"),
                            vrt_path,
                        ),
                        band: s.band.unwrap_or(1).saturating_sub(1),
                        src_rect: s.src_rect.map(Into::into),
                        dst_rect: s.dst_rect.map(Into::into),
                        nodata: parse_nodata(s.nodata.as_deref())?,
                    })
                })
                .collect::<RasterResult<Vec<_>>>()?;
            bands.push((
                number,
                VrtBand {
                    nodata: parse_nodata(band.nodata.as_deref())?,
                    sources,
                },
            ));
        }
        bands.sort_by_key(|(n, _)| *n);

        Ok(Self {
            width: doc.raster_x_size,
            height: doc.raster_y_size,
            transform,
            bands: bands.into_iter().map(|(_, b)| b).collect(),
        })
    }

    pub fn window_for(&self, bbox: &BoundingBox) -> Option<PixelWindow> {
        self.transform.window_for(bbox, self.width, self.height)
    }

    /// Storage keys of the sources of `bands` that may overlap `window`.
    pub fn sources_for(&self, window: &PixelWindow, bands: &[usize]) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for band in bands.iter().filter_map(|&b| self.bands.get(b)) {
            for source in &band.sources {
                let overlaps = source
                    .dst_rect
                    .or(source.src_rect)
                    .map_or(true, |r| dst_pixels(&r).intersect(window).is_some());
                if overlaps && !paths.contains(&source.path) {
                    paths.push(source.path.clone());
                }
            }
        }
        paths
    }

    /// Composite `bands` over `bbox` from already opened source files.
    pub fn read_bbox(
        &self,
        bbox: &BoundingBox,
        bands: &[usize],
        files: &HashMap<String, Arc<GeoTiffFile>>,
        chunks: &Mutex<ChunkCache>,
    ) -> RasterResult<RasterWindow> {
        match self.window_for(bbox) {
            Some(window) => Ok(RasterWindow {
                transform: self.transform,
                window,
                bands: self.read_window(window, bands, files, chunks)?,
            }),
            None => Ok(RasterWindow::empty(self.transform, bands.len())),
        }
    }

    /// Composite `bands` (0-based) over a mosaic pixel window.
    pub fn read_window(
        &self,
        window: PixelWindow,
        bands: &[usize],
        files: &HashMap<String, Arc<GeoTiffFile>>,
        chunks: &Mutex<ChunkCache>,
    ) -> RasterResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(bands.len());
        for &b in bands {
            let band = self.bands.get(b).ok_or(RasterError::MissingBands {
                available: self.bands.len(),
                requested: b + 1,
            })?;

            let mut plane = vec![f32::NAN; window.len()];
            for source in &band.sources {
                let file = files.get(&source.path).ok_or_else(|| {
                    RasterError::Storage(format!("mosaic source {} not loaded", source.path))
                })?;
                paint_source(&mut plane, &window, source, file, chunks)?;
            }

            if let Some(nd) = band.nodata {
                let nd = nd as f32;
                plane.iter_mut().filter(|v| **v == nd).for_each(|v| *v = f32::NAN);
            }
            out.push(plane);
        }
        Ok(out)
    }
}

/// Nearest-neighbour copy of one source into the output plane.
fn paint_source(
    plane: &mut [f32],
    window: &PixelWindow,
    source: &VrtSource,
    file: &GeoTiffFile,
    chunks: &Mutex<ChunkCache>,
) -> RasterResult<()> {
    let info = file.info();
    let src = source.src_rect.unwrap_or(VrtRect {
        x_off: 0.0,
        y_off: 0.0,
        x_size: info.width as f64,
        y_size: info.height as f64,
    });
    let dst = source.dst_rect.unwrap_or(src);
    if dst.x_size <= 0.0 || dst.y_size <= 0.0 {
        return Ok(());
    }

    let Some(area) = dst_pixels(&dst).intersect(window) else {
        return Ok(());
    };

    let scale_x = src.x_size / dst.x_size;
    let scale_y = src.y_size / dst.y_size;
    let src_col = |col: usize| (src.x_off + (col as f64 + 0.5 - dst.x_off) * scale_x).floor() as i64;
    let src_row = |row: usize| (src.y_off + (row as f64 + 0.5 - dst.y_off) * scale_y).floor() as i64;

    let c0 = src_col(area.x_off).max(0);
    let c1 = src_col(area.x_end() - 1).min(info.width as i64 - 1);
    let r0 = src_row(area.y_off).max(0);
    let r1 = src_row(area.y_end() - 1).min(info.height as i64 - 1);
    if c1 < c0 || r1 < r0 {
        return Ok(());
    }

    let src_window = PixelWindow::new(
        c0 as usize,
        r0 as usize,
        (c1 - c0 + 1) as usize,
        (r1 - r0 + 1) as usize,
    );
    let data = file
        .read_window(src_window, &[source.band], chunks)?
        .pop()
        .unwrap_or_default();
    let nodata = source.nodata.map(|v| v as f32);

    for row in area.y_off..area.y_end() {
        let sr = src_row(row);
        if sr < r0 || sr > r1 {
            continue;
        }
        for col in area.x_off..area.x_end() {
            let sc = src_col(col);
            if sc < c0 || sc > c1 {
                continue;
            }
            let v = data[(sr - r0) as usize * src_window.width + (sc - c0) as usize];
            if v.is_nan() || nodata == Some(v) {
                continue;
            }
            plane[(row - window.y_off) * window.width + (col - window.x_off)] = v;
        }
    }
    Ok(())
}

/// Mosaic pixels covered by a destination rectangle.
fn dst_pixels(r: &VrtRect) -> PixelWindow {
    let x0 = r.x_off.round().max(0.0) as usize;
    let y0 = r.y_off.round().max(0.0) as usize;
    let x1 = (r.x_off + r.x_size).round().max(0.0) as usize;
    let y1 = (r.y_off + r.y_size).round().max(0.0) as usize;
    PixelWindow::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
}

fn parse_nodata(value: Option<&str>) -> RasterResult<Option<f64>> {
    let Some(text) = value.map(str::trim) else {
        return Ok(None);
    };
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| RasterError::Malformed(format!("unparseable nodata value '{}'", text)))
}

/// Map a VRT source filename to a storage key.
///
/// `/vsis3/bucket/key` becomes `key`; relative names are joined to the VRT's
/// directory.
pub(crate) fn resolve_source_path(name: &str, relative: bool, vrt_path: &str) -> String {
    let name = name.trim();
    if let Some(rest) = name.strip_prefix("/vsis3/") {
        return rest.split_once('/').map_or(rest, |(_, key)| key).to_string();
    }
    if !relative {
        return name.trim_start_matches('/').to_string();
    }

    let mut parts: Vec<&str> = vrt_path.split('/').collect();
    parts.pop();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use test_utils::GeoTiffBuilder;

    const MOSAIC: &str = r#"<VRTDataset rasterXSize="4" rasterYSize="2">
  <SRS>EPSG:4326</SRS>
  <GeoTransform> 0.0, 1.0, 0.0, 2.0, 0.0, -1.0</GeoTransform>
  <VRTRasterBand dataType="Float32" band="1">
    <NoDataValue>-9999</NoDataValue>
    <ColorInterp>Gray</ColorInterp>
    <SimpleSource>
      <SourceFilename relativeToVRT="1">tiles/west.tif</SourceFilename>
      <SourceBand>1</SourceBand>
      <SrcRect xOff="0" yOff="0" xSize="2" ySize="2"/>
      <DstRect xOff="0" yOff="0" xSize="2" ySize="2"/>
    </SimpleSource>
    <SimpleSource>
      <SourceFilename relativeToVRT="0">/vsis3/rezoning-data/datasets/tiles/east.tif</SourceFilename>
      <SourceBand>1</SourceBand>
      <SrcRect xOff="0" yOff="0" xSize="2" ySize="2"/>
      <DstRect xOff="2" yOff="0" xSize="2" ySize="2"/>
    </SimpleSource>
  </VRTRasterBand>
</VRTDataset>"#;

    fn open(path: &str, data: Vec<f32>, origin_x: f64) -> (String, Arc<GeoTiffFile>) {
        let bytes = GeoTiffBuilder::new(2, 2, (origin_x, 2.0), 1.0)
            .band(data)
            .nodata(-9999.0)
            .build();
        let file = GeoTiffFile::open(path, Bytes::from(bytes)).unwrap();
        (path.to_string(), Arc::new(file))
    }

    #[test]
    fn test_parse_mosaic() {
        let vrt = VrtDataset::parse(MOSAIC, "datasets/raster-exclusions.vrt").unwrap();
        assert_eq!((vrt.width, vrt.height), (4, 2));
        assert_eq!(vrt.transform, GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        assert_eq!(vrt.bands.len(), 1);
        assert_eq!(vrt.bands[0].nodata, Some(-9999.0));
        let paths: Vec<_> = vrt.bands[0].sources.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, ["datasets/tiles/west.tif", "datasets/tiles/east.tif"]);
    }

    #[test]
    fn test_sources_for_window() {
        let vrt = VrtDataset::parse(MOSAIC, "datasets/raster-exclusions.vrt").unwrap();
        let west_only = vrt.sources_for(&PixelWindow::new(0, 0, 2, 2), &[0]);
        assert_eq!(west_only, ["datasets/tiles/west.tif"]);
        assert_eq!(vrt.sources_for(&PixelWindow::full(4, 2), &[0]).len(), 2);
    }

    #[test]
    fn test_read_composites_sources() {
        let vrt = VrtDataset::parse(MOSAIC, "datasets/raster-exclusions.vrt").unwrap();
        let files: HashMap<_, _> = [
            open("datasets/tiles/west.tif", vec![1.0, 2.0, -9999.0, 4.0], 0.0),
            open("datasets/tiles/east.tif", vec![5.0, 6.0, 7.0, 8.0], 2.0),
        ]
        .into_iter()
        .collect();
        let chunks = Mutex::new(ChunkCache::new(1024 * 1024));

        let planes = vrt
            .read_window(PixelWindow::full(4, 2), &[0], &files, &chunks)
            .unwrap();
        let p = &planes[0];
        assert_eq!(&p[..4], &[1.0, 2.0, 5.0, 6.0]);
        assert!(p[4].is_nan());
        assert_eq!(&p[5..], &[4.0, 7.0, 8.0]);
    }

    #[test]
    fn test_missing_source_is_error() {
        let vrt = VrtDataset::parse(MOSAIC, "datasets/raster-exclusions.vrt").unwrap();
        let chunks = Mutex::new(ChunkCache::new(0));
        let err = vrt
            .read_window(PixelWindow::full(4, 2), &[0], &HashMap::new(), &chunks)
            .unwrap_err();
        assert!(matches!(err, RasterError::Storage(_)));
    }

    #[test]
    fn test_missing_band_is_error() {
        let vrt = VrtDataset::parse(MOSAIC, "datasets/raster-exclusions.vrt").unwrap();
        let chunks = Mutex::new(ChunkCache::new(0));
        let err = vrt
            .read_window(PixelWindow::full(4, 2), &[1], &HashMap::new(), &chunks)
            .unwrap_err();
        assert!(matches!(err, RasterError::MissingBands { available: 1, requested: 2 }));
    }

    #[test]
    fn test_rejects_bad_xml() {
        assert!(VrtDataset::parse("<VRTDataset>", "a.vrt").is_err());
        let rotated = MOSAIC.replace("0.0, 1.0, 0.0, 2.0", "0.0, 1.0, 0.3, 2.0");
        assert!(matches!(
            VrtDataset::parse(&rotated, "a.vrt"),
            Err(RasterError::Unsupported(_))
        ));
    }

    #[test]
    fn test_resolve_source_path() {
        assert_eq!(resolve_source_path("a.tif", true, "datasets/x.vrt"), "datasets/a.tif");
        assert_eq!(resolve_source_path("../a.tif", true, "datasets/m/x.vrt"), "datasets/a.tif");
        assert_eq!(resolve_source_path("a.tif", true, "x.vrt"), "a.tif");
        assert_eq!(resolve_source_path("/vsis3/bucket/k/a.tif", false, "x.vrt"), "k/a.tif");
        assert_eq!(resolve_source_path("/data/a.tif", false, "x.vrt"), "data/a.tif");
    }
}
