//! Super-resolution reconstruction from detected particles.
//!
//! Index independent: gathers maxima from every non-discarded upstream
//! frame and renders them as Gaussian splats. Buffers its output by
//! default since a full pass pulls the entire series.

use anyhow::{Result, bail};

use crate::config::MAX_RECONSTRUCTION_PIXELS;
use crate::entities::attribute::AttributeType;
use crate::entities::attrs::AttrValue;
use crate::entities::frame::Frame;
use crate::entities::graph::EvalContext;
use crate::entities::keys::{A_COORDINATES_IN, A_RECONSTRUCTION_OUT, P_OUTPUT_PIXEL_SIZE, P_SPLAT_SIGMA};
use crate::entities::node::{Node, NodeBase};
use crate::entities::particles::ParticleSet;

#[derive(Debug)]
pub struct ReconstructionNode {
    base: NodeBase,
}

impl Default for ReconstructionNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Particles plus the physical size `(w, h)` in nm of the source frames.
#[derive(Debug, Clone, Default)]
pub struct Localisations {
    pub particles: ParticleSet,
    pub extent: [f64; 2],
}

impl ReconstructionNode {
    pub const TITLE: &'static str = "Reconstruction";

    pub fn new() -> Self {
        let mut base = NodeBase::new(Self::TITLE)
            .with_input(A_COORDINATES_IN, AttributeType::Coordinates)
            .with_output(A_RECONSTRUCTION_OUT, AttributeType::Reconstruction);
        base.buffer_last_output = true;
        base.params.set(P_OUTPUT_PIXEL_SIZE, AttrValue::Float(10.0));
        base.params.set(P_SPLAT_SIGMA, AttrValue::Float(15.0));
        base.params.clear_dirty();
        Self { base }
    }

    /// Pull every upstream frame and collect its maxima as particles.
    pub fn collect(&self, ctx: &EvalContext) -> Result<Localisations> {
        let sigma = self.base.params.get_float_or(P_SPLAT_SIGMA, 15.0);
        let n = ctx.input_frame_count(self.base.id, A_COORDINATES_IN);
        let mut out = Localisations::default();
        for i in 0..n {
            let Some(frame) = ctx.pull(self.base.id, A_COORDINATES_IN, Some(i))? else {
                continue;
            };
            if frame.discard {
                continue;
            }
            let extent = [frame.width() as f64 * frame.pixel_size, frame.height() as f64 * frame.pixel_size];
            out.extent = [out.extent[0].max(extent[0]), out.extent[1].max(extent[1])];
            out.particles.extend(ParticleSet::from_frame(&frame, sigma));
        }
        log::debug!("{}: {} particles from {} frames", Self::TITLE, out.particles.len(), n);
        Ok(out)
    }
}

impl Node for ReconstructionNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn get_image_impl(&self, _idx: Option<usize>, ctx: &EvalContext) -> Result<Option<Frame>> {
        if self.base.input_link(A_COORDINATES_IN).is_none() {
            return Ok(None);
        }
        let ps = self.base.params.get_float_or(P_OUTPUT_PIXEL_SIZE, 10.0);
        if ps <= 0.0 {
            bail!("Output pixel size must be positive, got {}", ps);
        }
        let loc = self.collect(ctx)?;
        let (wf, hf) = ((loc.extent[0] / ps).ceil(), (loc.extent[1] / ps).ceil());
        if !(wf * hf <= MAX_RECONSTRUCTION_PIXELS as f64) {
            bail!(
                "Reconstruction of {}x{} px at {} nm exceeds the limit of {} pixels",
                wf,
                hf,
                ps,
                MAX_RECONSTRUCTION_PIXELS
            );
        }
        let (w, h) = (wf as usize, hf as usize);
        if w == 0 || h == 0 {
            return Ok(None);
        }

        let pixels = loc.particles.render([0.0, 0.0], w, h, ps);
        let mut frame = Frame::from_pixels(w, h, pixels)?;
        frame.pixel_size = ps;
        frame.scalar_metrics.insert("n_particles".into(), loc.particles.len() as f64);
        Ok(Some(frame))
    }

    fn frame_count(&self, _ctx: &EvalContext) -> usize {
        usize::from(self.base.input_link(A_COORDINATES_IN).is_some())
    }

    fn index_independent(&self) -> bool {
        true
    }
}
