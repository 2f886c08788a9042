//! Integer binning: each output pixel reduces a `factor x factor` block.

use anyhow::{Result, bail};
use rayon::prelude::*;

use super::pull_dataset;
use crate::entities::attribute::AttributeType;
use crate::entities::attrs::AttrValue;
use crate::entities::frame::Frame;
use crate::entities::graph::EvalContext;
use crate::entities::keys::{A_DATASET_IN, A_DATASET_OUT, P_BIN_MODE, P_FACTOR};
use crate::entities::node::{Node, NodeBase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinMode {
    Sum,
    Mean,
    Max,
    Min,
}

impl BinMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(BinMode::Sum),
            "mean" => Some(BinMode::Mean),
            "max" => Some(BinMode::Max),
            "min" => Some(BinMode::Min),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct BinImageNode {
    base: NodeBase,
}

impl Default for BinImageNode {
    fn default() -> Self {
        Self::new()
    }
}

impl BinImageNode {
    pub const TITLE: &'static str = "Bin image";

    pub fn new() -> Self {
        let mut base = NodeBase::new(Self::TITLE)
            .with_input(A_DATASET_IN, AttributeType::Dataset)
            .with_output(A_DATASET_OUT, AttributeType::Dataset);
        base.params.set(P_FACTOR, AttrValue::Int(2));
        base.params.set(P_BIN_MODE, AttrValue::Str("sum".into()));
        base.params.clear_dirty();
        Self { base }
    }
}

/// Bin `px` (`w x h`); trailing rows/columns that do not fill a block are dropped.
pub fn bin_pixels(px: &[f32], w: usize, h: usize, factor: usize, mode: BinMode) -> (usize, usize, Vec<f32>) {
    let (ow, oh) = (w / factor, h / factor);
    let mut out = vec![0.0f32; ow * oh];
    out.par_chunks_mut(ow.max(1)).enumerate().for_each(|(oy, row)| {
        for (ox, dst) in row.iter_mut().enumerate() {
            let block = (0..factor).flat_map(|dy| {
                let start = (oy * factor + dy) * w + ox * factor;
                px[start..start + factor].iter().copied()
            });
            *dst = match mode {
                BinMode::Sum => block.sum(),
                BinMode::Mean => block.sum::<f32>() / (factor * factor) as f32,
                BinMode::Max => block.fold(f32::NEG_INFINITY, f32::max),
                BinMode::Min => block.fold(f32::INFINITY, f32::min),
            };
        }
    });
    (ow, oh, out)
}

impl Node for BinImageNode {
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
        let factor = self.base.params.get_i64_or(P_FACTOR, 2).max(1) as usize;
        let mode_name = self.base.params.get_str_or(P_BIN_MODE, "sum");
        let Some(mode) = BinMode::from_name(mode_name) else {
            bail!("Unknown bin mode '{}'", mode_name);
        };
        if factor == 1 {
            return Ok(Some(frame));
        }

        let (ow, oh, px) = frame.with_pixels(|px, w, h| bin_pixels(px, w, h, factor, mode))?;
        if ow == 0 || oh == 0 {
            bail!("Frame {}x{} is smaller than bin factor {}", frame.width(), frame.height(), factor);
        }
        let mut out = frame.derive(ow, oh, px)?;
        out.pixel_size = frame.pixel_size * factor as f64;
        out.maxima = frame
            .maxima
            .iter()
            .map(|m| [m[0] / factor as f64, m[1] / factor as f64])
            .collect();
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_modes() {
        // 4x2: [1 2 3 4 / 5 6 7 8]
        let px: Vec<f32> = (1..=8).map(|v| v as f32).collect();
        assert_eq!(bin_pixels(&px, 4, 2, 2, BinMode::Sum), (2, 1, vec![14.0, 22.0]));
        assert_eq!(bin_pixels(&px, 4, 2, 2, BinMode::Mean).2, vec![3.5, 5.5]);
        assert_eq!(bin_pixels(&px, 4, 2, 2, BinMode::Max).2, vec![6.0, 8.0]);
        assert_eq!(bin_pixels(&px, 4, 2, 2, BinMode::Min).2, vec![1.0, 3.0]);
    }

    #[test]
    fn test_bin_drops_partial_blocks() {
        let px = vec![1.0f32; 5 * 3];
        let (w, h, out) = bin_pixels(&px, 5, 3, 2, BinMode::Sum);
        assert_eq!((w, h), (2, 1));
        assert_eq!(out, vec![4.0, 4.0]);
    }
}
