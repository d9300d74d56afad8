//! In-memory dataset reader for tests and fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rezoning_common::{LcoeError, LcoeResult};

use crate::registry::DatasetDef;
use crate::types::{DatasetArray, Region};

use super::{align_window, DatasetReader, RasterWindow, ResamplingMethod};

/// Serves datasets from georeferenced rasters held in memory.
///
/// Reads go through the same alignment as storage-backed reads, so fixtures
/// at any resolution land on the request's output grid.
#[derive(Default)]
pub struct MemoryReader {
    rasters: HashMap<String, RasterWindow>,
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    resampling: ResamplingMethod,
    reads: Mutex<HashMap<String, usize>>,
    total_reads: AtomicUsize,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `dataset` from `raster`, one band per declared layer.
    pub fn with_raster(mut self, dataset: &str, raster: RasterWindow) -> Self {
        self.rasters.insert(dataset.to_string(), raster);
        self
    }

    /// Delay reads of `dataset` (to exercise completion order).
    pub fn with_delay(mut self, dataset: &str, delay: Duration) -> Self {
        self.delays.insert(dataset.to_string(), delay);
        self
    }

    /// Fail every read of `dataset`.
    pub fn with_failure(mut self, dataset: &str) -> Self {
        self.failures.insert(dataset.to_string());
        self
    }

    pub fn with_resampling(mut self, method: ResamplingMethod) -> Self {
        self.resampling = method;
        self
    }

    /// Number of reads issued for `dataset`.
    pub fn read_count(&self, dataset: &str) -> usize {
        self.reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(dataset)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.total_reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DatasetReader for MemoryReader {
    async fn read(&self, dataset: &DatasetDef, region: &Region) -> LcoeResult<DatasetArray> {
        *self
            .reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(dataset.id.clone())
            .or_default() += 1;
        self.total_reads.fetch_add(1, Ordering::Relaxed);

        if let Some(delay) = self.delays.get(&dataset.id) {
            tokio::time::sleep(*delay).await;
        }

        if self.failures.contains(&dataset.id) {
            return Err(LcoeError::dataset_read(&dataset.id, "simulated read failure"));
        }

        let raster = self
            .rasters
            .get(&dataset.id)
            .ok_or_else(|| LcoeError::dataset_read(&dataset.id, "no such dataset"))?;

        if raster.band_count() < dataset.layers.len() {
            return Err(LcoeError::dataset_read(
                &dataset.id,
                format!(
                    "raster has {} bands, {} requested",
                    raster.band_count(),
                    dataset.layers.len()
                ),
            ));
        }

        let mut planes = if dataset.nodata.iter().any(Option::is_some) {
            let mut masked = raster.clone();
            masked.mask_sentinels(&dataset.nodata);
            align_window(&masked, region, self.resampling)
        } else {
            align_window(raster, region, self.resampling)
        };
        planes.truncate(dataset.layers.len());

        Ok(DatasetArray {
            dataset: dataset.id.clone(),
            layers: dataset.layers.clone(),
            planes,
        })
    }
}
