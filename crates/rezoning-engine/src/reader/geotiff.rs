//! GeoTIFF decoding: georeferencing tags and windowed chunk reads.
//!
//! Only the chunks (strips or tiles) overlapping a window are decompressed.
//! Decoded chunks go through the shared [`ChunkCache`].

use bytes::Bytes;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::{PlanarConfiguration, Tag};
use tracing::debug;

use rezoning_common::BoundingBox;

use super::cache::{hash_path, CacheWeight, ChunkCache, ChunkData};
use super::{GeoTransform, PixelWindow, RasterError, RasterResult, RasterWindow};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GDAL_NODATA: u16 = 42113;

/// Structure of a GeoTIFF read from its first IFD.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffInfo {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    /// Samples (bands) per pixel.
    pub samples: usize,
    pub nodata: Option<f64>,
    pub chunk_width: usize,
    pub chunk_height: usize,
}

impl GeoTiffInfo {
    pub fn chunks_across(&self) -> usize {
        self.width.div_ceil(self.chunk_width)
    }

    pub fn chunks_down(&self) -> usize {
        self.height.div_ceil(self.chunk_height)
    }
}

/// An in-memory GeoTIFF file.
#[derive(Debug)]
pub struct GeoTiffFile {
    path: String,
    path_hash: u64,
    bytes: Bytes,
    info: GeoTiffInfo,
}

impl CacheWeight for GeoTiffFile {
    fn weight(&self) -> usize {
        self.bytes.len()
    }
}

impl GeoTiffFile {
    /// Parse the header and georeferencing of a GeoTIFF.
    pub fn open(path: &str, bytes: Bytes) -> RasterResult<Self> {
        let mut decoder = Decoder::new(Cursor::new(bytes.clone()))?;
        let info = read_info(&mut decoder)?;
        debug!(
            path = %path,
            width = info.width,
            height = info.height,
            samples = info.samples,
            chunk_width = info.chunk_width,
            chunk_height = info.chunk_height,
            "Opened GeoTIFF"
        );
        Ok(Self {
            path: path.to_string(),
            path_hash: hash_path(path),
            bytes,
            info,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn info(&self) -> &GeoTiffInfo {
        &self.info
    }

    pub fn transform(&self) -> GeoTransform {
        self.info.transform
    }

    /// Pixel window covering `bbox`, or `None` if the raster misses it.
    pub fn window_for(&self, bbox: &BoundingBox) -> Option<PixelWindow> {
        self.info
            .transform
            .window_for(bbox, self.info.width, self.info.height)
    }

    /// Read `bands` (0-based) over `bbox`.
    pub fn read_bbox(
        &self,
        bbox: &BoundingBox,
        bands: &[usize],
        chunks: &Mutex<ChunkCache>,
    ) -> RasterResult<RasterWindow> {
        match self.window_for(bbox) {
            Some(window) => Ok(RasterWindow {
                transform: self.info.transform,
                window,
                bands: self.read_window(window, bands, chunks)?,
            }),
            None => Ok(RasterWindow::empty(self.info.transform, bands.len())),
        }
    }

    /// Read `bands` (0-based) over a pixel window, one row-major plane per
    /// requested band.
    pub fn read_window(
        &self,
        window: PixelWindow,
        bands: &[usize],
        chunks: &Mutex<ChunkCache>,
    ) -> RasterResult<Vec<Vec<f32>>> {
        if let Some(&max) = bands.iter().max() {
            if max >= self.info.samples {
                return Err(RasterError::MissingBands {
                    available: self.info.samples,
                    requested: max + 1,
                });
            }
        }

        let mut out = vec![vec![f32::NAN; window.len()]; bands.len()];
        let window = match window.intersect(&PixelWindow::full(self.info.width, self.info.height)) {
            Some(w) => w,
            None => return Ok(out),
        };
        let out_width = window.width;

        let cw = self.info.chunk_width;
        let ch = self.info.chunk_height;
        let mut decoder: Option<Decoder<Cursor<Bytes>>> = None;

        for cy in (window.y_off / ch)..=((window.y_end() - 1) / ch) {
            for cx in (window.x_off / cw)..=((window.x_end() - 1) / cw) {
                let index = (cy * self.info.chunks_across() + cx) as u32;
                let chunk = self.chunk(index, cx * cw, &mut decoder, chunks)?;

                let chunk_window = PixelWindow::new(cx * cw, cy * ch, chunk.width, chunk.height);
                let Some(overlap) = chunk_window.intersect(&window) else {
                    continue;
                };

                for row in overlap.y_off..overlap.y_end() {
                    for col in overlap.x_off..overlap.x_end() {
                        let dst = (row - window.y_off) * out_width + (col - window.x_off);
                        for (plane, &band) in out.iter_mut().zip(bands) {
                            plane[dst] = chunk.value(band, col - cx * cw, row - cy * ch);
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    fn chunk(
        &self,
        index: u32,
        x0: usize,
        decoder: &mut Option<Decoder<Cursor<Bytes>>>,
        chunks: &Mutex<ChunkCache>,
    ) -> RasterResult<Arc<ChunkData>> {
        let key = (self.path_hash, index);
        if let Some(chunk) = chunks.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(chunk);
        }

        let decoder = match decoder {
            Some(d) => d,
            None => decoder.insert(Decoder::new(Cursor::new(self.bytes.clone()))?),
        };
        let values = decoding_to_f32(decoder.read_chunk(index)?);
        let chunk = Arc::new(self.split_chunk(values, x0)?);

        chunks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, chunk.clone());
        Ok(chunk)
    }

    /// De-interleave chunk samples into bands and mask no-data.
    fn split_chunk(&self, values: Vec<f32>, x0: usize) -> RasterResult<ChunkData> {
        let samples = self.info.samples;
        let pixels = values.len() / samples;
        let (cw, ch) = (self.info.chunk_width, self.info.chunk_height);

        // Edge chunks are either padded to the full chunk size or cropped.
        let width = if pixels == cw * ch {
            cw
        } else {
            cw.min(self.info.width - x0)
        };
        if width == 0 || pixels % width != 0 {
            return Err(RasterError::Malformed(format!(
                "chunk of {} pixels does not fit width {}",
                pixels, width
            )));
        }

        let nodata = self.info.nodata.map(|v| v as f32);
        let mut bands = vec![Vec::with_capacity(pixels); samples];
        for pixel in values.chunks_exact(samples) {
            for (band, &v) in bands.iter_mut().zip(pixel) {
                let masked = match nodata {
                    Some(nd) if v == nd => f32::NAN,
                    _ => v,
                };
                band.push(masked);
            }
        }

        Ok(ChunkData {
            width,
            height: pixels / width,
            bands,
        })
    }
}

fn read_info(decoder: &mut Decoder<Cursor<Bytes>>) -> RasterResult<GeoTiffInfo> {
    let (width, height) = decoder.dimensions()?;
    let (chunk_width, chunk_height) = decoder.chunk_dimensions();

    let samples = decoder
        .find_tag(Tag::SamplesPerPixel)?
        .map(|v| v.into_u32())
        .transpose()?
        .unwrap_or(1) as usize;

    let planar = decoder
        .find_tag(Tag::PlanarConfiguration)?
        .map(|v| v.into_u16())
        .transpose()?;
    if planar == Some(PlanarConfiguration::Planar.to_u16()) {
        return Err(RasterError::Unsupported(
            "planar (band-separate) TIFFs are not supported".to_string(),
        ));
    }

    let transform = read_transform(decoder)?;

    let nodata = match decoder.find_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))? {
        Some(value) => {
            let text = value.into_string()?;
            let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            match text.parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) if text.eq_ignore_ascii_case("nan") => None,
                Err(_) => {
                    return Err(RasterError::Malformed(format!(
                        "unparseable nodata value '{}'",
                        text
                    )))
                }
            }
        }
        None => None,
    };

    Ok(GeoTiffInfo {
        width: width as usize,
        height: height as usize,
        transform,
        samples: samples.max(1),
        nodata,
        chunk_width: chunk_width as usize,
        chunk_height: chunk_height as usize,
    })
}

fn read_transform(decoder: &mut Decoder<Cursor<Bytes>>) -> RasterResult<GeoTransform> {
    let scale = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let tiepoint = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT))?
        .map(|v| v.into_f64_vec())
        .transpose()?;

    if let (Some(scale), Some(tie)) = (scale, tiepoint) {
        if scale.len() < 2 || tie.len() < 6 {
            return Err(RasterError::Malformed(
                "short ModelPixelScale/ModelTiepoint tags".to_string(),
            ));
        }
        let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
        let transform = GeoTransform::new(x - i * scale[0], y + j * scale[1], scale[0], -scale[1]);
        transform.validate()?;
        return Ok(transform);
    }

    let matrix = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_MODEL_TRANSFORMATION))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    match matrix {
        Some(m) if m.len() >= 8 => GeoTransform::from_gdal(&[m[3], m[0], m[1], m[7], m[4], m[5]]),
        Some(_) => Err(RasterError::Malformed(
            "short ModelTransformation tag".to_string(),
        )),
        None => Err(RasterError::Malformed(
            "TIFF has no georeferencing tags".to_string(),
        )),
    }
}

fn decoding_to_f32(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U16(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I16(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::GeoTiffBuilder;

    fn ramp(width: usize, height: usize) -> Vec<f32> {
        (0..width * height).map(|i| i as f32).collect()
    }

    #[test]
    fn test_open_reads_georeferencing() {
        let bytes = GeoTiffBuilder::new(8, 4, (10.0, 50.0), 0.25)
            .band(ramp(8, 4))
            .nodata(-9999.0)
            .build();
        let file = GeoTiffFile::open("calc.tif", Bytes::from(bytes)).unwrap();
        let info = file.info();
        assert_eq!((info.width, info.height, info.samples), (8, 4, 1));
        assert_eq!(info.nodata, Some(-9999.0));
        assert_eq!(info.transform, GeoTransform::new(10.0, 50.0, 0.25, -0.25));
    }

    #[test]
    fn test_read_window_across_strips() {
        let bytes = GeoTiffBuilder::new(6, 6, (0.0, 6.0), 1.0)
            .band(ramp(6, 6))
            .rows_per_strip(2)
            .build();
        let file = GeoTiffFile::open("a.tif", Bytes::from(bytes)).unwrap();
        assert_eq!(file.info().chunks_down(), 3);

        let cache = Mutex::new(ChunkCache::new(1024 * 1024));
        let planes = file
            .read_window(PixelWindow::new(1, 1, 3, 3), &[0], &cache)
            .unwrap();
        assert_eq!(planes[0], vec![7.0, 8.0, 9.0, 13.0, 14.0, 15.0, 19.0, 20.0, 21.0]);

        // Second read is served from the chunk cache
        let misses = cache.lock().unwrap().stats().misses;
        file.read_window(PixelWindow::new(1, 1, 3, 3), &[0], &cache)
            .unwrap();
        let stats = cache.lock().unwrap().stats();
        assert_eq!(stats.misses, misses);
        assert!(stats.hits >= 2);
    }

    #[test]
    fn test_nodata_becomes_nan() {
        let mut data = vec![1.0; 4];
        data[2] = -9999.0;
        let bytes = GeoTiffBuilder::new(2, 2, (0.0, 2.0), 1.0)
            .band(data)
            .nodata(-9999.0)
            .build();
        let file = GeoTiffFile::open("n.tif", Bytes::from(bytes)).unwrap();
        let cache = Mutex::new(ChunkCache::new(0));
        let planes = file
            .read_window(PixelWindow::full(2, 2), &[0], &cache)
            .unwrap();
        assert_eq!(planes[0][0], 1.0);
        assert!(planes[0][2].is_nan());
    }

    #[test]
    fn test_multiband_band_selection() {
        let bytes = GeoTiffBuilder::new(2, 1, (0.0, 1.0), 1.0)
            .band(vec![1.0, 2.0])
            .band(vec![10.0, 20.0])
            .band(vec![100.0, 200.0])
            .build();
        let file = GeoTiffFile::open("m.tif", Bytes::from(bytes)).unwrap();
        assert_eq!(file.info().samples, 3);
        let cache = Mutex::new(ChunkCache::new(1024));
        let planes = file
            .read_window(PixelWindow::full(2, 1), &[2, 0], &cache)
            .unwrap();
        assert_eq!(planes, vec![vec![100.0, 200.0], vec![1.0, 2.0]]);

        let err = file
            .read_window(PixelWindow::full(2, 1), &[3], &cache)
            .unwrap_err();
        assert!(matches!(err, RasterError::MissingBands { available: 3, requested: 4 }));
    }

    #[test]
    fn test_read_bbox_outside_is_empty() {
        let bytes = GeoTiffBuilder::new(2, 2, (0.0, 2.0), 1.0)
            .band(vec![1.0; 4])
            .build();
        let file = GeoTiffFile::open("o.tif", Bytes::from(bytes)).unwrap();
        let cache = Mutex::new(ChunkCache::new(1024));
        let raster = file
            .read_bbox(&BoundingBox::new(50.0, 50.0, 60.0, 60.0), &[0], &cache)
            .unwrap();
        assert!(raster.window.is_empty());
        assert_eq!(raster.band_count(), 1);
    }

    #[test]
    fn test_rejects_non_tiff() {
        assert!(GeoTiffFile::open("bad.tif", Bytes::from_static(b"not a tiff")).is_err());
    }

    #[test]
    fn test_rejects_missing_georeferencing() {
        let bytes = GeoTiffBuilder::new(2, 2, (0.0, 2.0), 1.0)
            .band(vec![1.0; 4])
            .without_georeferencing()
            .build();
        let err = GeoTiffFile::open("plain.tif", Bytes::from(bytes)).unwrap_err();
        assert!(matches!(err, RasterError::Malformed(_)));
    }
}
