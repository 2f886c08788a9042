//! Gaussian blur and difference of Gaussians.
//!
//! Separable convolution with edge clamping; both passes run row-parallel
//! on rayon.

use anyhow::{Result, bail};
use rayon::prelude::*;

use super::pull_dataset;
use crate::entities::attribute::AttributeType;
use crate::entities::attrs::AttrValue;
use crate::entities::frame::Frame;
use crate::entities::graph::EvalContext;
use crate::entities::keys::{A_DATASET_IN, A_DATASET_OUT, P_FILTER, P_SIGMA, P_SIGMA_OUTER};
use crate::entities::node::{Node, NodeBase};

#[derive(Debug)]
pub struct SpatialFilterNode {
    base: NodeBase,
}

impl Default for SpatialFilterNode {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialFilterNode {
    pub const TITLE: &'static str = "Spatial filter";

    pub fn new() -> Self {
        let mut base = NodeBase::new(Self::TITLE)
            .with_input(A_DATASET_IN, AttributeType::Dataset)
            .with_output(A_DATASET_OUT, AttributeType::Dataset);
        base.params.set(P_FILTER, AttrValue::Str("gaussian".into()));
        base.params.set(P_SIGMA, AttrValue::Float(1.0));
        base.params.set(P_SIGMA_OUTER, AttrValue::Float(3.0));
        base.params.clear_dirty();
        Self { base }
    }
}

/// Normalised 1D Gaussian kernel with radius `ceil(3 sigma)`.
fn kernel(sigma: f64) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil() as i64;
    let k: Vec<f64> = (-radius..=radius)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = k.iter().sum();
    k.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Gaussian blur of a `w x h` buffer. `sigma <= 0` returns a copy.
pub fn gaussian_blur(px: &[f32], w: usize, h: usize, sigma: f64) -> Vec<f32> {
    if sigma <= 0.0 || w == 0 || h == 0 {
        return px.to_vec();
    }
    let k = kernel(sigma);
    let r = (k.len() / 2) as isize;
    let clamp = |v: isize, n: usize| v.clamp(0, n as isize - 1) as usize;

    let mut tmp = vec![0.0f32; w * h];
    tmp.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let src = &px[y * w..(y + 1) * w];
        for (x, dst) in row.iter_mut().enumerate() {
            *dst = k
                .iter()
                .enumerate()
                .map(|(i, kv)| kv * src[clamp(x as isize + i as isize - r, w)])
                .sum();
        }
    });

    let mut out = vec![0.0f32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, dst) in row.iter_mut().enumerate() {
            *dst = k
                .iter()
                .enumerate()
                .map(|(i, kv)| kv * tmp[clamp(y as isize + i as isize - r, h) * w + x])
                .sum();
        }
    });
    out
}

impl Node for SpatialFilterNode {
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
        let sigma = p.get_float_or(P_SIGMA, 1.0);
        let filtered = match p.get_str_or(P_FILTER, "gaussian") {
            "gaussian" => frame.with_pixels(|px, w, h| gaussian_blur(px, w, h, sigma))?,
            "dog" => {
                let outer = p.get_float_or(P_SIGMA_OUTER, 3.0);
                frame.with_pixels(|px, w, h| {
                    let inner = gaussian_blur(px, w, h, sigma);
                    let wide = gaussian_blur(px, w, h, outer);
                    inner.iter().zip(&wide).map(|(a, b)| a - b).collect::<Vec<f32>>()
                })?
            }
            other => bail!("Unknown filter '{}'", other),
        };
        let (w, h) = (frame.width(), frame.height());
        frame.set_pixels(w, h, filtered)?;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_normalised() {
        let k = kernel(1.5);
        assert_eq!(k.len(), 11);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert_eq!(k[0], k[10]);
    }

    #[test]
    fn test_blur_preserves_flat_and_mass() {
        let flat = vec![7.0f32; 6 * 5];
        for v in gaussian_blur(&flat, 6, 5, 1.0) {
            assert!((v - 7.0).abs() < 1e-5);
        }

        let mut spike = vec![0.0f32; 21 * 21];
        spike[10 * 21 + 10] = 100.0;
        let out = gaussian_blur(&spike, 21, 21, 1.0);
        assert!((out.iter().sum::<f32>() - 100.0).abs() < 1e-3);
        assert!(out[10 * 21 + 10] < 100.0);
        assert!(out[10 * 21 + 11] > 0.0);
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let px = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(gaussian_blur(&px, 2, 2, 0.0), px);
    }
}
