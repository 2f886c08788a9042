//! Crop every frame to a fixed ROI.

use anyhow::Result;

use super::pull_dataset;
use crate::entities::attribute::AttributeType;
use crate::entities::frame::Frame;
use crate::entities::graph::EvalContext;
use crate::entities::keys::{A_DATASET_IN, A_DATASET_OUT, P_ROI};
use crate::entities::node::{Node, NodeBase};

#[derive(Debug)]
pub struct CropImageNode {
    base: NodeBase,
}

impl Default for CropImageNode {
    fn default() -> Self {
        Self::new()
    }
}

impl CropImageNode {
    pub const TITLE: &'static str = "Crop image";

    /// Without a `roi` parameter frames pass through unchanged.
    pub fn new() -> Self {
        let base = NodeBase::new(Self::TITLE)
            .with_input(A_DATASET_IN, AttributeType::Dataset)
            .with_output(A_DATASET_OUT, AttributeType::Dataset);
        Self { base }
    }
}

impl Node for CropImageNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn get_image_impl(&self, idx: Option<usize>, ctx: &EvalContext) -> Result<Option<Frame>> {
        let Some(frame) = pull_dataset(ctx, &self.base, idx)? else {
            return Ok(None);
        };
        match self.base.params.get_roi(P_ROI) {
            Some(roi) => Ok(Some(frame.crop(roi)?)),
            None => Ok(Some(frame)),
        }
    }
}
