//! Local maxima detection.
//!
//! A pixel is a candidate when it is above `mean + k * std` and not smaller
//! than any of its 8 neighbours. Candidates are accepted brightest first,
//! skipping any closer than `min_distance` to an accepted one.

use anyhow::Result;

use super::pull_dataset;
use crate::entities::attribute::AttributeType;
use crate::entities::attrs::AttrValue;
use crate::entities::frame::{Frame, compute_stats};
use crate::entities::graph::EvalContext;
use crate::entities::keys::{A_COORDINATES_OUT, A_DATASET_IN, A_DATASET_OUT, P_MIN_DISTANCE, P_THRESHOLD_K};
use crate::entities::node::{Node, NodeBase};

#[derive(Debug)]
pub struct ParticleDetectionNode {
    base: NodeBase,
}

impl Default for ParticleDetectionNode {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleDetectionNode {
    pub const TITLE: &'static str = "Particle detection";

    pub fn new() -> Self {
        let mut base = NodeBase::new(Self::TITLE)
            .with_input(A_DATASET_IN, AttributeType::Dataset)
            .with_output(A_DATASET_OUT, AttributeType::Dataset)
            .with_output(A_COORDINATES_OUT, AttributeType::Coordinates);
        base.params.set(P_THRESHOLD_K, AttrValue::Float(3.0));
        base.params.set(P_MIN_DISTANCE, AttrValue::Int(3));
        base.params.clear_dirty();
        Self { base }
    }
}

/// Maxima `[x, y]` (pixel units) above `threshold`.
pub fn detect_maxima(px: &[f32], w: usize, h: usize, threshold: f32, min_distance: f64) -> Vec<[f64; 2]> {
    let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let v = px[y * w + x];
            if v <= threshold {
                continue;
            }
            let is_max = (y.saturating_sub(1)..(y + 2).min(h))
                .flat_map(|ny| (x.saturating_sub(1)..(x + 2).min(w)).map(move |nx| (nx, ny)))
                .all(|(nx, ny)| px[ny * w + nx] <= v);
            if is_max {
                candidates.push((v, x, y));
            }
        }
    }
    // Brightest first; ties keep scan order.
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let min_d2 = min_distance * min_distance;
    let mut accepted: Vec<[f64; 2]> = Vec::new();
    for (_, x, y) in candidates {
        let p = [x as f64, y as f64];
        let far = accepted
            .iter()
            .all(|q| (q[0] - p[0]).powi(2) + (q[1] - p[1]).powi(2) >= min_d2);
        if far {
            accepted.push(p);
        }
    }
    accepted
}

impl Node for ParticleDetectionNode {
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
        let k = self.base.params.get_float_or(P_THRESHOLD_K, 3.0);
        let min_distance = self.base.params.get_i64_or(P_MIN_DISTANCE, 3).max(0) as f64;

        let maxima = frame.with_pixels(|px, w, h| {
            let stats = compute_stats(px);
            let threshold = (stats.mean + k * stats.std) as f32;
            detect_maxima(px, w, h, threshold, min_distance)
        })?;
        log::trace!("Frame {}: {} particles", frame.index, maxima.len());
        frame.scalar_metrics.insert("n_particles".into(), maxima.len() as f64);
        frame.maxima = maxima;
        Ok(Some(frame))
    }
}
