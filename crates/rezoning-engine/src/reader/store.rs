//! Dataset reader backed by object storage.

use futures::future::try_join_all;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, instrument, warn};

use rezoning_common::{LcoeError, LcoeResult};

use crate::config::EngineConfig;
use crate::registry::{DatasetDef, SourceKind};
use crate::storage::ObjectStorage;
use crate::types::{DatasetArray, Region};

use super::cache::{CacheStats, ChunkCache, SizedLruCache};
use super::geotiff::GeoTiffFile;
use super::vrt::VrtDataset;
use super::{align_window, DatasetReader, RasterError, RasterWindow, ResamplingMethod};

/// Memory budget for parsed mosaic descriptions.
const MOSAIC_CACHE_BYTES: usize = 4 * 1024 * 1024;

type FileCache = SizedLruCache<String, Arc<GeoTiffFile>>;
type MosaicCache = SizedLruCache<String, Arc<VrtDataset>>;

/// Reads `<prefix>/<dataset>.tif` and `<prefix>/<dataset>.vrt` objects.
///
/// Fetched files and decoded chunks are cached across requests; a dataset's
/// layers map to its bands in declaration order.
pub struct RasterStoreReader {
    storage: ObjectStorage,
    prefix: String,
    resampling: ResamplingMethod,
    files: Mutex<FileCache>,
    mosaics: Mutex<MosaicCache>,
    chunks: Arc<Mutex<ChunkCache>>,
}

impl RasterStoreReader {
    pub fn new(storage: ObjectStorage, prefix: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
            resampling: config.resampling,
            files: Mutex::new(FileCache::new(config.source_cache_size_bytes())),
            mosaics: Mutex::new(MosaicCache::new(MOSAIC_CACHE_BYTES)),
            chunks: Arc::new(Mutex::new(ChunkCache::new(config.chunk_cache_size_bytes()))),
        }
    }

    /// Statistics of the (file, chunk) caches.
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner()).stats();
        let chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner()).stats();
        (files, chunks)
    }

    async fn open_tiff(&self, path: &str) -> Result<Arc<GeoTiffFile>, RasterError> {
        let cached = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&path.to_string());
        if let Some(file) = cached {
            return Ok(file);
        }

        let bytes = self
            .storage
            .get(path)
            .await
            .map_err(|e| RasterError::Storage(e.to_string()))?;
        let file = Arc::new(GeoTiffFile::open(path, bytes)?);

        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), file.clone());
        Ok(file)
    }

    async fn open_vrt(&self, path: &str) -> Result<Arc<VrtDataset>, RasterError> {
        let cached = self
            .mosaics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&path.to_string());
        if let Some(vrt) = cached {
            return Ok(vrt);
        }

        let bytes = self
            .storage
            .get(path)
            .await
            .map_err(|e| RasterError::Storage(e.to_string()))?;
        let xml = std::str::from_utf8(&bytes)
            .map_err(|e| RasterError::Malformed(format!("VRT is not UTF-8: {}", e)))?;
        let vrt = Arc::new(VrtDataset::parse(xml, path)?);
        debug!(path = %path, bands = vrt.bands.len(), "Parsed mosaic");

        self.mosaics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), vrt.clone());
        Ok(vrt)
    }

    async fn read_planes(&self, dataset: &DatasetDef, region: &Region) -> Result<Vec<Vec<f32>>, RasterError> {
        let key = dataset.storage_key(&self.prefix);
        let bands: Vec<usize> = (0..dataset.layers.len()).collect();
        let bbox = region.bbox();
        let chunks = self.chunks.clone();
        let method = self.resampling;
        let region = region.clone();

        match dataset.source {
            SourceKind::File => {
                let file = self.open_tiff(&key).await?;
                if file.info().samples < bands.len() {
                    return Err(RasterError::MissingBands {
                        available: file.info().samples,
                        requested: bands.len(),
                    });
                }
                let sentinels: Vec<Option<f32>> = if file.info().nodata.is_some() {
                    Vec::new()
                } else {
                    bands.iter().map(|&b| dataset.fallback_nodata(b)).collect()
                };
                run_blocking(move || {
                    let mut raster = file.read_bbox(&bbox, &bands, &chunks)?;
                    raster.mask_sentinels(&sentinels);
                    Ok(align_window(&raster, &region, method))
                })
                .await
            }
            SourceKind::Mosaic => {
                let vrt = self.open_vrt(&key).await?;
                if vrt.bands.len() < bands.len() {
                    return Err(RasterError::MissingBands {
                        available: vrt.bands.len(),
                        requested: bands.len(),
                    });
                }
                let Some(window) = vrt.window_for(&bbox) else {
                    let empty = RasterWindow::empty(vrt.transform, bands.len());
                    return Ok(align_window(&empty, &region, method));
                };

                let sentinels: Vec<Option<f32>> = bands
                    .iter()
                    .map(|&b| match vrt.bands[b].nodata {
                        Some(_) => None,
                        None => dataset.fallback_nodata(b),
                    })
                    .collect();
                let paths = vrt.sources_for(&window, &bands);
                let opened = try_join_all(paths.iter().map(|p| self.open_tiff(p))).await?;
                let files: HashMap<String, Arc<GeoTiffFile>> = paths.into_iter().zip(opened).collect();

                run_blocking(move || {
                    let mut raster = RasterWindow {
                        transform: vrt.transform,
                        window,
                        bands: vrt.read_window(window, &bands, &files, &chunks)?,
                    };
                    raster.mask_sentinels(&sentinels);
                    Ok(align_window(&raster, &region, method))
                })
                .await
            }
        }
    }
}

/// Run CPU-bound decoding off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T, RasterError>
where
    F: FnOnce() -> Result<T, RasterError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RasterError::Storage(format!("decode task failed: {}", e)))?
}

#[async_trait::async_trait]
impl DatasetReader for RasterStoreReader {
    #[instrument(skip(self, dataset, region), fields(dataset = %dataset.id))]
    async fn read(&self, dataset: &DatasetDef, region: &Region) -> LcoeResult<DatasetArray> {
        let start = Instant::now();
        counter!("rezoning_dataset_reads_total", "dataset" => dataset.id.clone()).increment(1);

        match self.read_planes(dataset, region).await {
            Ok(planes) => {
                histogram!("rezoning_dataset_read_duration_seconds", "dataset" => dataset.id.clone())
                    .record(start.elapsed().as_secs_f64());
                debug!(
                    layers = planes.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Read dataset"
                );
                Ok(DatasetArray {
                    dataset: dataset.id.clone(),
                    layers: dataset.layers.clone(),
                    planes,
                })
            }
            Err(e) => {
                counter!("rezoning_dataset_read_errors_total", "dataset" => dataset.id.clone())
                    .increment(1);
                warn!(error = %e, "Dataset read failed");
                Err(LcoeError::dataset_read(&dataset.id, e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;
    use rezoning_common::{Geometry, Polygon};
    use test_utils::GeoTiffBuilder;

    fn square(min: f64, max: f64) -> Geometry {
        Geometry::Polygon(Polygon::new(vec![
            (min, min),
            (max, min),
            (max, max),
            (min, max),
            (min, min),
        ]))
    }

    fn dataset(id: &str, source: SourceKind, layers: &[&str]) -> DatasetDef {
        DatasetDef {
            id: id.to_string(),
            source,
            layers: layers.iter().map(|l| l.to_string()).collect(),
            nodata: Vec::new(),
        }
    }

    async fn reader_with(objects: Vec<(&str, Bytes)>) -> RasterStoreReader {
        let storage = ObjectStorage::from_store(Arc::new(InMemory::new()), "memory");
        for (path, bytes) in objects {
            storage.put(path, bytes).await.unwrap();
        }
        RasterStoreReader::new(storage, "datasets", &EngineConfig::default())
    }

    #[tokio::test]
    async fn test_reads_tiff_bands_in_layer_order() {
        let tif = GeoTiffBuilder::new(4, 4, (0.0, 4.0), 1.0)
            .band(vec![1.0; 16])
            .band(vec![2.0; 16])
            .band(vec![3.0; 16])
            .build();
        let reader = reader_with(vec![("datasets/calc.tif", Bytes::from(tif))]).await;
        let region = Region::polygon(square(0.0, 4.0), 4, None).unwrap();

        let ds = dataset("calc", SourceKind::File, &["a", "b", "c"]);
        let array = reader.read(&ds, &region).await.unwrap();
        assert_eq!(array.layers, ["a", "b", "c"]);
        assert_eq!(array.planes.len(), 3);
        assert!(array.planes[1].iter().all(|&v| v == 2.0));

        // Cached file: a second read does not refetch
        reader.read(&ds, &region).await.unwrap();
        let (files, _) = reader.cache_stats();
        assert_eq!(files.hits, 1);
    }

    #[tokio::test]
    async fn test_missing_object_is_dataset_read_error() {
        let reader = reader_with(vec![]).await;
        let region = Region::polygon(square(0.0, 1.0), 2, None).unwrap();
        let err = reader
            .read(&dataset("calc", SourceKind::File, &["a"]), &region)
            .await
            .unwrap_err();
        assert_eq!(err.error_kind(), "upstream_read_failure");
    }

    #[tokio::test]
    async fn test_too_few_bands_is_error() {
        let tif = GeoTiffBuilder::new(2, 2, (0.0, 2.0), 1.0)
            .band(vec![1.0; 4])
            .build();
        let reader = reader_with(vec![("datasets/calc.tif", Bytes::from(tif))]).await;
        let region = Region::polygon(square(0.0, 2.0), 2, None).unwrap();
        let err = reader
            .read(&dataset("calc", SourceKind::File, &["a", "b"]), &region)
            .await
            .unwrap_err();
        assert!(matches!(err, LcoeError::DatasetRead { .. }));
    }

    #[tokio::test]
    async fn test_reads_mosaic() {
        let vrt = r#"<VRTDataset rasterXSize="4" rasterYSize="2">
  <GeoTransform>0, 1, 0, 2, 0, -1</GeoTransform>
  <VRTRasterBand band="1">
    <SimpleSource>
      <SourceFilename relativeToVRT="1">excl/west.tif</SourceFilename>
      <SourceBand>1</SourceBand>
      <SrcRect xOff="0" yOff="0" xSize="2" ySize="2"/>
      <DstRect xOff="0" yOff="0" xSize="2" ySize="2"/>
    </SimpleSource>
    <SimpleSource>
      <SourceFilename relativeToVRT="1">excl/east.tif</SourceFilename>
      <SourceBand>1</SourceBand>
      <SrcRect xOff="0" yOff="0" xSize="2" ySize="2"/>
      <DstRect xOff="2" yOff="0" xSize="2" ySize="2"/>
    </SimpleSource>
  </VRTRasterBand>
</VRTDataset>"#;
        let west = GeoTiffBuilder::new(2, 2, (0.0, 2.0), 1.0).band(vec![0.0; 4]).build();
        let east = GeoTiffBuilder::new(2, 2, (2.0, 2.0), 1.0).band(vec![1.0; 4]).build();
        let reader = reader_with(vec![
            ("datasets/raster-exclusions.vrt", Bytes::from(vrt)),
            ("datasets/excl/west.tif", Bytes::from(west)),
            ("datasets/excl/east.tif", Bytes::from(east)),
        ])
        .await;

        let aoi = Geometry::Polygon(Polygon::new(vec![
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, 2.0),
            (0.0, 2.0),
            (0.0, 0.0),
        ]));
        let region = Region::polygon(aoi, 4, None).unwrap();
        let ds = dataset("raster-exclusions", SourceKind::Mosaic, &["protected"]);
        let array = reader.read(&ds, &region).await.unwrap();
        assert_eq!(array.planes[0], vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_region_outside_raster_is_all_nodata() {
        let tif = GeoTiffBuilder::new(2, 2, (0.0, 2.0), 1.0)
            .band(vec![1.0; 4])
            .build();
        let reader = reader_with(vec![("datasets/calc.tif", Bytes::from(tif))]).await;
        let region = Region::polygon(square(40.0, 50.0), 3, None).unwrap();
        let array = reader
            .read(&dataset("calc", SourceKind::File, &["a"]), &region)
            .await
            .unwrap();
        assert_eq!(array.planes[0].len(), 9);
        assert!(array.planes[0].iter().all(|v| v.is_nan()));
    }

    #[tokio::test]
    async fn test_registry_nodata_applies_to_untagged_sources() {
        let untagged = GeoTiffBuilder::new(2, 2, (0.0, 2.0), 1.0)
            .band(vec![5.0, -9999.0, 7.0, 8.0])
            .build();
        let tagged = GeoTiffBuilder::new(2, 2, (0.0, 2.0), 1.0)
            .band(vec![5.0, -9999.0, 7.0, -1.0])
            .nodata(-1.0)
            .build();
        let reader = reader_with(vec![
            ("datasets/slope.tif", Bytes::from(untagged)),
            ("datasets/tagged.tif", Bytes::from(tagged)),
        ])
        .await;
        let region = Region::polygon(square(0.0, 2.0), 2, None).unwrap();

        let mut ds = dataset("slope", SourceKind::File, &["slope"]);
        ds.nodata = vec![Some(-9999.0)];
        let array = reader.read(&ds, &region).await.unwrap();
        assert_eq!(array.nodata_mask(0), vec![false, true, false, false]);
        assert_eq!(array.planes[0][0], 5.0);

        // A sentinel declared by the file wins over the registry one
        let mut ds = dataset("tagged", SourceKind::File, &["slope"]);
        ds.nodata = vec![Some(-9999.0)];
        let array = reader.read(&ds, &region).await.unwrap();
        assert_eq!(array.nodata_mask(0), vec![false, false, false, true]);
        assert_eq!(array.planes[0][1], -9999.0);
    }
}
