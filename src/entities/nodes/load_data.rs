//! Source node: frames from an in-memory dataset or from image files.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, bail};

use crate::config::DEFAULT_PIXEL_SIZE;
use crate::entities::attribute::AttributeType;
use crate::entities::attrs::AttrValue;
use crate::entities::dataset::Dataset;
use crate::entities::frame::Frame;
use crate::entities::graph::EvalContext;
use crate::entities::keys::{A_DATASET_OUT, P_PATH, P_PIXEL_SIZE};
use crate::entities::node::{Node, NodeBase};

#[derive(Debug)]
pub struct LoadDataNode {
    base: NodeBase,
    /// Dataset handed over programmatically; wins over `path`.
    memory: Option<Arc<Dataset>>,
    /// Dataset opened from `path`, keyed by the params hash it was opened with.
    opened: Mutex<Option<(u64, Arc<Dataset>)>>,
}

impl Default for LoadDataNode {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadDataNode {
    pub const TITLE: &'static str = "Load data";

    pub fn new() -> Self {
        let mut base = NodeBase::new(Self::TITLE).with_output(A_DATASET_OUT, AttributeType::Dataset);
        base.params.set(P_PATH, AttrValue::Str(String::new()));
        base.params.set(P_PIXEL_SIZE, AttrValue::Float(DEFAULT_PIXEL_SIZE));
        base.params.clear_dirty();
        Self { base, memory: None, opened: Mutex::new(None) }
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.set_dataset(dataset);
        self.base.params.clear_dirty();
        self
    }

    /// Use an in-memory dataset. Its pixel size becomes the node's.
    pub fn set_dataset(&mut self, dataset: Dataset) {
        self.base.params.set(P_PIXEL_SIZE, AttrValue::Float(dataset.pixel_size()));
        self.memory = Some(Arc::new(dataset));
    }

    pub fn pixel_size(&self) -> f64 {
        self.base.params.get_float_or(P_PIXEL_SIZE, DEFAULT_PIXEL_SIZE)
    }

    /// Current dataset, opening `path` on first use. `None` when nothing is configured.
    pub fn dataset(&self) -> Result<Option<Arc<Dataset>>> {
        if let Some(ds) = &self.memory {
            return Ok(Some(Arc::clone(ds)));
        }
        let path = self.base.params.get_str_or(P_PATH, "");
        if path.is_empty() {
            return Ok(None);
        }

        let key = self.base.params.hash_all();
        let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((k, ds)) = opened.as_ref()
            && *k == key
        {
            return Ok(Some(Arc::clone(ds)));
        }
        let ds = Arc::new(Dataset::from_path(std::path::Path::new(path), self.pixel_size())?);
        *opened = Some((key, Arc::clone(&ds)));
        Ok(Some(ds))
    }
}

impl Node for LoadDataNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn get_image_impl(&self, idx: Option<usize>, _ctx: &EvalContext) -> Result<Option<Frame>> {
        let Some(ds) = self.dataset()? else {
            return Ok(None);
        };
        let i = idx.unwrap_or_else(|| ds.current_frame());
        let Some(frame) = ds.get(i) else {
            bail!("Frame {} out of range ({} frames)", i, ds.n_frames());
        };
        frame.load()?;
        Ok(Some(frame.clone()))
    }

    fn frame_count(&self, _ctx: &EvalContext) -> usize {
        match self.dataset() {
            Ok(ds) => ds.map(|d| d.n_frames()).unwrap_or(0),
            Err(e) => {
                log::warn!("{}: {:#}", Self::TITLE, e);
                0
            }
        }
    }

    fn on_param_changed(&mut self) {
        let ps = self.pixel_size();
        if let Some(ds) = self.memory.as_mut()
            && ds.pixel_size() != ps
        {
            Arc::make_mut(ds).set_pixel_size(ps);
        }
    }
}
