//! In-memory GeoTIFF encoding for reader tests.
//!
//! Produces north-up float rasters with the GeoTIFF pixel-scale and
//! tie-point tags, and optionally the GDAL no-data tag.

use std::io::Cursor;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GDAL_NODATA: u16 = 42113;

/// Builder for single-band (gray) or three-band (RGB) float32 GeoTIFFs.
///
/// ```ignore
/// let bytes = GeoTiffBuilder::new(8, 4, (10.0, 50.0), 0.25)
///     .band(vec![0.0; 32])
///     .nodata(-9999.0)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct GeoTiffBuilder {
    width: u32,
    height: u32,
    origin: (f64, f64),
    pixel_size: f64,
    bands: Vec<Vec<f32>>,
    nodata: Option<f64>,
    rows_per_strip: Option<u32>,
    georeferenced: bool,
}

impl GeoTiffBuilder {
    /// `origin` is the lon/lat of the top-left corner; pixels are square.
    pub fn new(width: u32, height: u32, origin: (f64, f64), pixel_size: f64) -> Self {
        Self {
            width,
            height,
            origin,
            pixel_size,
            bands: Vec::new(),
            nodata: None,
            rows_per_strip: None,
            georeferenced: true,
        }
    }

    /// Append a band (row-major, `width * height` values).
    pub fn band(mut self, data: Vec<f32>) -> Self {
        self.bands.push(data);
        self
    }

    pub fn nodata(mut self, value: f64) -> Self {
        self.nodata = Some(value);
        self
    }

    pub fn rows_per_strip(mut self, rows: u32) -> Self {
        self.rows_per_strip = Some(rows);
        self
    }

    /// Omit the georeferencing tags.
    pub fn without_georeferencing(mut self) -> Self {
        self.georeferenced = false;
        self
    }

    /// Encode the raster.
    ///
    /// # Panics
    ///
    /// If the band count is not 1 or 3, or a band has the wrong length.
    pub fn build(self) -> Vec<u8> {
        let pixels = (self.width * self.height) as usize;
        for band in &self.bands {
            assert_eq!(band.len(), pixels, "band length must be width * height");
        }

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).expect("tiff encoder");
            match self.bands.len() {
                1 => {
                    let mut image = encoder
                        .new_image::<colortype::Gray32Float>(self.width, self.height)
                        .expect("gray image");
                    self.write_tags(image.encoder());
                    if let Some(rows) = self.rows_per_strip {
                        image.rows_per_strip(rows).expect("rows per strip");
                    }
                    image.write_data(&self.bands[0]).expect("write gray data");
                }
                3 => {
                    let interleaved: Vec<f32> = (0..pixels)
                        .flat_map(|i| self.bands.iter().map(move |band| band[i]))
                        .collect();
                    let mut image = encoder
                        .new_image::<colortype::RGB32Float>(self.width, self.height)
                        .expect("rgb image");
                    self.write_tags(image.encoder());
                    if let Some(rows) = self.rows_per_strip {
                        image.rows_per_strip(rows).expect("rows per strip");
                    }
                    image.write_data(&interleaved).expect("write rgb data");
                }
                n => panic!("GeoTiffBuilder supports 1 or 3 bands, got {}", n),
            }
        }
        buffer.into_inner()
    }

    fn write_tags<W: std::io::Write + std::io::Seek, K: tiff::encoder::TiffKind>(
        &self,
        directory: &mut tiff::encoder::DirectoryEncoder<'_, W, K>,
    ) {
        if self.georeferenced {
            let scale = [self.pixel_size, self.pixel_size, 0.0];
            let tiepoint = [0.0, 0.0, 0.0, self.origin.0, self.origin.1, 0.0];
            directory
                .write_tag(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE), &scale[..])
                .expect("pixel scale tag");
            directory
                .write_tag(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT), &tiepoint[..])
                .expect("tiepoint tag");
        }
        if let Some(nodata) = self.nodata {
            let text = format!("{}", nodata);
            directory
                .write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), text.as_str())
                .expect("nodata tag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::decoder::{Decoder, DecodingResult};

    #[test]
    fn test_build_gray_round_trips_values() {
        let data: Vec<f32> = (0..6).map(|i| i as f32).collect();
        let bytes = GeoTiffBuilder::new(3, 2, (0.0, 2.0), 1.0)
            .band(data.clone())
            .build();
        let mut decoder = Decoder::new(Cursor::new(bytes)).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));
        match decoder.read_image().unwrap() {
            DecodingResult::F32(values) => assert_eq!(values, data),
            _ => panic!("expected f32 data"),
        }
    }

    #[test]
    #[should_panic(expected = "supports 1 or 3 bands")]
    fn test_two_bands_rejected() {
        GeoTiffBuilder::new(1, 1, (0.0, 1.0), 1.0)
            .band(vec![0.0])
            .band(vec![1.0])
            .build();
    }
}
