//! Fixed-size worker pool for batched per-frame work.
//!
//! Frames are processed in batches of `batch_size`: every frame of a batch
//! runs in parallel on the pool, batches run one after another so progress
//! and the stop flag are checked between them. Results are keyed by frame
//! index; completion order inside a batch is unspecified.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use uuid::Uuid;

use super::tasks::TaskHandle;
use crate::config::Settings;
use crate::entities::graph::NodeGraph;
use crate::entities::image_io;
use crate::entities::node::Node;

/// Outputs of a batched run.
#[derive(Debug)]
pub struct BatchOutput<T> {
    pub outputs: BTreeMap<usize, T>,
    pub cancelled: bool,
}

pub struct Workers {
    pool: rayon::ThreadPool,
    batch_size: usize,
}

impl Workers {
    /// Recommended: `num_cpus::get() * 3 / 4` threads.
    pub fn new(num_threads: usize, batch_size: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("scnodes-worker-{}", i))
            .build()
            .context("Failed to build worker pool")?;
        log::trace!("Workers initialized: {} threads, batch {}", num_threads.max(1), batch_size.max(1));
        Ok(Self { pool, batch_size: batch_size.max(1) })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.export_threads(), settings.batch_size)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run `job` for every index in `0..count`.
    ///
    /// The first failing frame aborts the run after its batch; the error names the frame.
    pub fn run_batched<T, F>(&self, count: usize, handle: Option<&TaskHandle>, job: F) -> Result<BatchOutput<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let mut outputs = BTreeMap::new();
        let mut start = 0;
        while start < count {
            if handle.is_some_and(TaskHandle::stop_requested) {
                log::info!("Batched run stopped at frame {}/{}", start, count);
                return Ok(BatchOutput { outputs, cancelled: true });
            }
            let end = (start + self.batch_size).min(count);
            let batch: Vec<(usize, Result<T>)> =
                self.pool.install(|| (start..end).into_par_iter().map(|i| (i, job(i))).collect());
            for (i, result) in batch {
                let value = result.with_context(|| format!("Frame {} failed", i))?;
                outputs.insert(i, value);
            }
            start = end;
            if let Some(h) = handle {
                h.set_progress(start as f64 / count as f64);
            }
        }
        Ok(BatchOutput { outputs, cancelled: false })
    }
}

/// Evaluate `node` for every frame and write each result as a 16-bit TIFF into `dir`.
///
/// Files are named `{prefix}_{index:05}.tif`. Returns the written paths in frame order.
pub fn export_dataset(
    graph: &NodeGraph,
    node: Uuid,
    dir: &Path,
    prefix: &str,
    workers: &Workers,
    handle: Option<&TaskHandle>,
) -> Result<Vec<PathBuf>> {
    let title = graph
        .node(node)
        .map(|n| n.title())
        .ok_or_else(|| anyhow!("Node {} not found", node))?;
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let count = graph.frame_count(node);
    log::info!("Exporting {} frame(s) of '{}' to {}", count, title, dir.display());

    let batch = workers.run_batched(count, handle, |i| {
        let frame = graph
            .try_get_image(node, Some(i))?
            .ok_or_else(|| anyhow!("'{}' produced no output", title))?;
        let path = dir.join(format!("{}_{:05}.tif", prefix, i));
        frame.with_pixels(|px, w, h| image_io::save_tiff_counts(&path, w, h, px))??;
        Ok(path)
    })?;
    Ok(batch.outputs.into_values().collect())
}
