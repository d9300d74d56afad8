//! Dataset readers.
//!
//! A [`DatasetReader`] turns one dataset and one [`Region`] into a
//! [`DatasetArray`] on the region's output grid:
//!
//! - the output shape is fixed by the region, whatever the native resolution
//!   of the source (sampling happens at output pixel centers);
//! - pixels outside the region footprint or its exclusion polygon are no-data
//!   (`NaN`) without changing the shape;
//! - reads are independent, the caller decides the concatenation order.
//!
//! ```text
//! RasterStoreReader::read(dataset, region)
//!      │
//!      ├─► .tif: GeoTiffFile (FileCache) ──► chunks covering region (ChunkCache)
//!      │
//!      ├─► .vrt: VrtDataset ──► GeoTiffFile per source ──► composite window
//!      │
//!      └─► align_window: sample at pixel centers ──► DatasetArray
//! ```

mod align;
mod cache;
mod geotiff;
mod memory;
mod raster;
mod store;
mod vrt;

pub use align::{align_window, bilinear_interpolate, nearest_interpolate, ResamplingMethod};
pub use cache::{hash_path, CacheStats, CacheWeight, ChunkCache, ChunkData, ChunkKey, SizedLruCache};
pub use geotiff::{GeoTiffFile, GeoTiffInfo};
pub use memory::MemoryReader;
pub use raster::{GeoTransform, PixelWindow, RasterWindow};
pub use store::RasterStoreReader;
pub use vrt::{VrtBand, VrtDataset, VrtRect, VrtSource};

use async_trait::async_trait;
use thiserror::Error;

use rezoning_common::LcoeResult;

use crate::registry::DatasetDef;
use crate::types::{DatasetArray, Region};

/// Reads one dataset aligned to a region's output grid.
#[async_trait]
pub trait DatasetReader: Send + Sync {
    /// Read every declared layer of `dataset` over `region`.
    ///
    /// Any I/O or decode failure is `LcoeError::DatasetRead`; layers are
    /// never zero-filled to hide a failure.
    async fn read(&self, dataset: &DatasetDef, region: &Region) -> LcoeResult<DatasetArray>;
}

/// Low-level raster decoding errors. Readers wrap these into
/// `LcoeError::DatasetRead` with the dataset id.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("TIFF decode failed: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("VRT parse failed: {0}")]
    Vrt(#[from] quick_xml::DeError),

    #[error("unsupported raster: {0}")]
    Unsupported(String),

    #[error("malformed raster: {0}")]
    Malformed(String),

    #[error("raster has {available} bands, {requested} requested")]
    MissingBands { available: usize, requested: usize },

    #[error("{0}")]
    Storage(String),
}

pub type RasterResult<T> = std::result::Result<T, RasterError>;
