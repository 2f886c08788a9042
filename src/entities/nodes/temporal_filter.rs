//! Background subtraction over a symmetric window of neighbouring frames.

use anyhow::{Result, bail};
use rayon::prelude::*;

use super::pull_dataset;
use crate::entities::attribute::AttributeType;
use crate::entities::attrs::AttrValue;
use crate::entities::frame::{Frame, FrameError};
use crate::entities::graph::EvalContext;
use crate::entities::keys::{A_DATASET_IN, A_DATASET_OUT, P_TEMPORAL_MODE, P_WINDOW};
use crate::entities::node::{Node, NodeBase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalMode {
    Mean,
    Min,
    Median,
}

impl TemporalMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mean" => Some(TemporalMode::Mean),
            "min" => Some(TemporalMode::Min),
            "median" => Some(TemporalMode::Median),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct TemporalFilterNode {
    base: NodeBase,
}

impl Default for TemporalFilterNode {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalFilterNode {
    pub const TITLE: &'static str = "Temporal filter";

    pub fn new() -> Self {
        let mut base = NodeBase::new(Self::TITLE)
            .with_input(A_DATASET_IN, AttributeType::Dataset)
            .with_output(A_DATASET_OUT, AttributeType::Dataset);
        base.params.set(P_WINDOW, AttrValue::Int(2));
        base.params.set(P_TEMPORAL_MODE, AttrValue::Str("median".into()));
        base.params.clear_dirty();
        Self { base }
    }
}

/// Per-pixel background of equally sized planes.
pub fn background(planes: &[Vec<f32>], mode: TemporalMode) -> Vec<f32> {
    let n = planes.first().map(Vec::len).unwrap_or(0);
    (0..n)
        .into_par_iter()
        .map(|i| {
            let mut column: Vec<f32> = planes.iter().map(|p| p[i]).collect();
            match mode {
                TemporalMode::Mean => column.iter().sum::<f32>() / column.len() as f32,
                TemporalMode::Min => column.iter().copied().fold(f32::INFINITY, f32::min),
                TemporalMode::Median => {
                    column.sort_by(f32::total_cmp);
                    let m = column.len() / 2;
                    if column.len() % 2 == 0 { (column[m - 1] + column[m]) * 0.5 } else { column[m] }
                }
            }
        })
        .collect()
}

impl Node for TemporalFilterNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn get_image_impl(&self, idx: Option<usize>, ctx: &EvalContext) -> Result<Option<Frame>> {
        let center = idx.unwrap_or(0);
        let Some(mut frame) = pull_dataset(ctx, &self.base, Some(center))? else {
            return Ok(None);
        };
        let mode_name = self.base.params.get_str_or(P_TEMPORAL_MODE, "median");
        let Some(mode) = TemporalMode::from_name(mode_name) else {
            bail!("Unknown temporal filter mode '{}'", mode_name);
        };
        let window = self.base.params.get_i64_or(P_WINDOW, 2).max(0) as usize;
        let n = ctx.input_frame_count(self.base.id, A_DATASET_IN).max(center + 1);
        let lo = center.saturating_sub(window);
        let hi = (center + window).min(n - 1);

        let own = frame.pixels()?;
        let mut planes = Vec::with_capacity(hi - lo + 1);
        for i in lo..=hi {
            if i == center {
                planes.push(own.clone());
                continue;
            }
            let Some(neighbour) = pull_dataset(ctx, &self.base, Some(i))? else {
                continue;
            };
            let px = neighbour.pixels()?;
            if px.len() != own.len() {
                return Err(FrameError::SizeMismatch { expected: own.len(), actual: px.len() }.into());
            }
            planes.push(px);
        }

        let bg = background(&planes, mode);
        frame.with_pixels_mut(|px, _, _| {
            for (v, b) in px.iter_mut().zip(&bg) {
                *v -= b;
            }
        })?;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_modes() {
        let planes = vec![vec![1.0, 10.0], vec![3.0, 0.0], vec![8.0, 5.0]];
        assert_eq!(background(&planes, TemporalMode::Mean), vec![4.0, 5.0]);
        assert_eq!(background(&planes, TemporalMode::Min), vec![1.0, 0.0]);
        assert_eq!(background(&planes, TemporalMode::Median), vec![3.0, 5.0]);
        assert_eq!(background(&planes[..2], TemporalMode::Median), vec![2.0, 5.0]);
    }
}
