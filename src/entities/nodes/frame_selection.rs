//! Per-frame metrics and threshold-based discarding.

use anyhow::{Result, bail};

use super::pull_dataset;
use crate::entities::attribute::AttributeType;
use crate::entities::attrs::AttrValue;
use crate::entities::frame::Frame;
use crate::entities::graph::EvalContext;
use crate::entities::keys::{A_DATASET_IN, A_DATASET_OUT, P_KEEP_ABOVE, P_METRIC, P_THRESHOLD};
use crate::entities::node::{Node, NodeBase};

pub const METRICS: [&str; 4] = ["mean", "std", "min", "max"];

#[derive(Debug)]
pub struct FrameSelectionNode {
    base: NodeBase,
}

impl Default for FrameSelectionNode {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSelectionNode {
    pub const TITLE: &'static str = "Frame selection";

    pub fn new() -> Self {
        let mut base = NodeBase::new(Self::TITLE)
            .with_input(A_DATASET_IN, AttributeType::Dataset)
            .with_output(A_DATASET_OUT, AttributeType::Dataset);
        base.params.set(P_METRIC, AttrValue::Str("mean".into()));
        base.params.set(P_THRESHOLD, AttrValue::Float(0.0));
        base.params.set(P_KEEP_ABOVE, AttrValue::Bool(true));
        base.params.clear_dirty();
        Self { base }
    }
}

impl Node for FrameSelectionNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn get_image_impl(&self, idx: Option<usize>, ctx: &EvalContext) -> Result<Option<Frame>> {
        let Some(mut frame) = pull_dataset(ctx, &self.base, idx)? else {
            return Ok(None);
        };
        let p = &self.base.params;
        let metric = p.get_str_or(P_METRIC, "mean");
        if !METRICS.contains(&metric) {
            bail!("Unknown metric '{}', expected one of {:?}", metric, METRICS);
        }

        let stats = frame.stats()?;
        frame.scalar_metrics.insert("mean".into(), stats.mean);
        frame.scalar_metrics.insert("std".into(), stats.std);
        frame.scalar_metrics.insert("min".into(), stats.min as f64);
        frame.scalar_metrics.insert("max".into(), stats.max as f64);

        let value = frame.scalar_metrics.get(metric).copied().unwrap_or(0.0);
        let threshold = p.get_float_or(P_THRESHOLD, 0.0);
        frame.discard = if p.get_bool_or(P_KEEP_ABOVE, true) { value < threshold } else { value > threshold };
        Ok(Some(frame))
    }
}
