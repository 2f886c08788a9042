//! CPU rasteriser for the correlation editor.
//!
//! Every framebuffer pixel is mapped to a world point at its centre, then
//! each visible layer is sampled (nearest neighbour) and blended in layer
//! order. A pixel that no layer covers stays unoccupied; the occupancy mask
//! becomes the alpha channel on export.
//!
//! Two pixel mappings exist: through a [`Camera`] (interactive view, may be
//! rotated) and through a [`PixelGrid`] (axis-aligned export lattice, where a
//! pixel's world centre depends only on its global index). Particle layers
//! are splatted per pass on the pass's own pixel size.

use glam::DVec2;
use rayon::prelude::*;
use uuid::Uuid;

use super::compositor::{BlendMode, blend_rgb};
use crate::entities::camera::Camera;
use crate::entities::clem_frame::{ClemFrame, FrameSampler, Lut};
use crate::entities::particles::ParticleSet;

/// RGB float framebuffer plus occupancy mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    width: usize,
    height: usize,
    rgb: Vec<f32>,
    occupied: Vec<bool>,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            rgb: vec![0.0; width * height * 3],
            occupied: vec![false; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn clear(&mut self) {
        self.rgb.fill(0.0);
        self.occupied.fill(false);
    }

    pub fn rgb(&self, x: usize, y: usize) -> Option<[f32; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 3;
        Some([self.rgb[i], self.rgb[i + 1], self.rgb[i + 2]])
    }

    pub fn is_occupied(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.occupied[y * self.width + x]
    }

    /// Row slices `(rgb, occupancy)` of row `y`.
    pub(crate) fn row(&self, y: usize) -> (&[f32], &[bool]) {
        let w = self.width;
        (&self.rgb[y * w * 3..(y + 1) * w * 3], &self.occupied[y * w..(y + 1) * w])
    }
}

/// Axis-aligned pixel lattice in world space (Y up, rows counted downward).
///
/// Pixel `(x, y)` of a framebuffer drawn through the grid has its centre at
/// lattice index `offset + (x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelGrid {
    /// World position of the top-left corner of lattice pixel `(0, 0)`.
    pub top_left: DVec2,
    pub pixel_size: f64,
    pub offset: [usize; 2],
}

impl PixelGrid {
    pub fn new(top_left: DVec2, pixel_size: f64) -> Self {
        Self { top_left, pixel_size, offset: [0, 0] }
    }

    /// Same lattice, framebuffer origin moved to lattice pixel `(x, y)`.
    pub fn with_offset(self, x: usize, y: usize) -> Self {
        Self { offset: [x, y], ..self }
    }

    #[inline]
    pub fn centre(&self, x: usize, y: usize) -> DVec2 {
        let gx = (self.offset[0] + x) as f64 + 0.5;
        let gy = (self.offset[1] + y) as f64 + 0.5;
        DVec2::new(self.top_left.x + gx * self.pixel_size, self.top_left.y - gy * self.pixel_size)
    }

    /// Framebuffer pixel whose cell contains `world`, `None` left of or above the origin.
    pub fn index_of(&self, world: DVec2) -> Option<(usize, usize)> {
        let gx = ((world.x - self.top_left.x) / self.pixel_size).floor();
        let gy = ((self.top_left.y - world.y) / self.pixel_size).floor();
        if !(gx >= self.offset[0] as f64 && gy >= self.offset[1] as f64) {
            return None;
        }
        Some((gx as usize - self.offset[0], gy as usize - self.offset[1]))
    }
}

/// Localised particles drawn as Gaussian splats.
///
/// Particle coordinates are image-style (+Y down); world Y is flipped. The
/// splats are evaluated on demand at the pixel size of each render pass,
/// so exports are as sharp as the requested output pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleLayer {
    pub id: Uuid,
    pub title: String,
    particles: ParticleSet,
    /// World bounds including the splat margin.
    bounds: (DVec2, DVec2),
    pub lut: Lut,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub hide: bool,
}

impl ParticleLayer {
    /// Layer for `set`; `pixel_size` sets the outline margin and the initial contrast.
    /// `None` for an empty set.
    pub fn new(title: impl Into<String>, set: &ParticleSet, pixel_size: f64) -> Option<Self> {
        let (lo, hi) = set.bounds()?;
        let margin = set
            .particles
            .iter()
            .map(|p| p.reach(pixel_size))
            .fold(pixel_size, f64::max);
        let bounds = (
            DVec2::new(lo[0] - margin, -(hi[1] + margin)),
            DVec2::new(hi[0] + margin, -(lo[1] - margin)),
        );
        let peak = set
            .particles
            .iter()
            .filter_map(|p| p.density(0.0, 0.0, p.effective_sigma(pixel_size)))
            .fold(0.0, f64::max);
        log::debug!("Particle layer: {} particles, bounds {:?}", set.len(), bounds);
        Some(Self {
            id: Uuid::new_v4(),
            title: title.into(),
            particles: set.clone(),
            bounds,
            lut: Lut::grayscale(0.0, peak as f32),
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            hide: false,
        })
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn bounds(&self) -> (DVec2, DVec2) {
        self.bounds
    }

    #[inline]
    pub fn contains(&self, world: DVec2) -> bool {
        let (lo, hi) = self.bounds;
        world.x >= lo.x && world.x < hi.x && world.y >= lo.y && world.y < hi.y
    }

    /// Splat density (counts per nm²) at the centres of a `width x height`
    /// block of `grid`. Only particles whose reach overlaps the block are visited.
    pub fn splat(&self, grid: &PixelGrid, width: usize, height: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; width * height];
        if width == 0 || height == 0 {
            return out;
        }
        let ps = grid.pixel_size;
        let first = grid.centre(0, 0);
        let span = |lo: f64, hi: f64, n: usize| {
            let a = (lo.floor() - 1.0).max(0.0);
            let b = (hi.ceil() + 2.0).min(n as f64);
            if a < b { a as usize..b as usize } else { 0..0 }
        };

        for p in &self.particles.particles {
            let sigma = p.effective_sigma(ps);
            let reach = p.reach(ps);
            let (wx, wy) = (p.x, -p.y);
            let cols = span((wx - reach - first.x) / ps, (wx + reach - first.x) / ps, width);
            let rows = span((first.y - wy - reach) / ps, (first.y - wy + reach) / ps, height);
            for j in rows {
                for i in cols.clone() {
                    let c = grid.centre(i, j);
                    if let Some(v) = p.density(c.x - wx, c.y - wy, sigma) {
                        out[j * width + i] += v as f32;
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LayerSource<'a> {
    Frame(&'a ClemFrame),
    Particles(&'a ParticleLayer),
}

/// One layer as drawn: source plus display settings.
#[derive(Debug, Clone, Copy)]
pub struct RenderLayer<'a> {
    pub source: LayerSource<'a>,
    pub lut: Lut,
    pub opacity: f32,
    pub blend_mode: BlendMode,
}

impl<'a> RenderLayer<'a> {
    pub fn from_frame(frame: &'a ClemFrame) -> Self {
        Self {
            source: LayerSource::Frame(frame),
            lut: frame.lut,
            opacity: frame.opacity,
            blend_mode: frame.blend_mode,
        }
    }

    pub fn from_particles(layer: &'a ParticleLayer) -> Self {
        Self {
            source: LayerSource::Particles(layer),
            lut: layer.lut,
            opacity: layer.opacity,
            blend_mode: layer.blend_mode,
        }
    }

    /// Same layer with a white LUT (keeping contrast), full opacity, normal blend.
    pub fn grayscale(self) -> Self {
        Self {
            lut: Lut::grayscale(self.lut.contrast_min, self.lut.contrast_max),
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            ..self
        }
    }

    pub fn title(&self) -> &str {
        match self.source {
            LayerSource::Frame(f) => &f.title,
            LayerSource::Particles(p) => &p.title,
        }
    }

    /// World-space `(min, max)` of the layer outline.
    pub fn bounds(&self) -> (DVec2, DVec2) {
        match self.source {
            LayerSource::Frame(f) => f.quad().bounds(),
            LayerSource::Particles(p) => p.bounds(),
        }
    }

    pub fn is_visible(&self) -> bool {
        let hidden = match self.source {
            LayerSource::Frame(f) => f.hide,
            LayerSource::Particles(p) => p.hide,
        };
        !hidden && self.opacity > 0.0
    }
}

/// Axis-aligned world bounds of everything `camera` shows.
pub fn view_bounds(camera: &Camera) -> (DVec2, DVec2) {
    let vp = camera.viewport();
    let corners = [DVec2::ZERO, DVec2::new(vp.x, 0.0), vp, DVec2::new(0.0, vp.y)]
        .map(|c| camera.cursor_to_world_position(c));
    corners[1..]
        .iter()
        .fold((corners[0], corners[0]), |(lo, hi), c| (lo.min(*c), hi.max(*c)))
}

/// Overlap test of two `(min, max)` boxes, edges included.
pub fn bounds_overlap(a: (DVec2, DVec2), b: (DVec2, DVec2)) -> bool {
    a.0.x <= b.1.x && b.0.x <= a.1.x && a.0.y <= b.1.y && b.0.y <= a.1.y
}

/// A layer prepared for one render pass.
enum Pass<'a> {
    Frame(FrameSampler<'a>),
    /// Splats evaluated on the framebuffer's own pixel grid.
    Aligned { layer: &'a ParticleLayer, width: usize, values: Vec<f32> },
    /// Splats on an axis-aligned raster, looked up by world point.
    Resampled { layer: &'a ParticleLayer, grid: PixelGrid, width: usize, height: usize, values: Vec<f32> },
}

impl Pass<'_> {
    #[inline]
    fn sample(&self, x: usize, y: usize, world: DVec2) -> Option<f32> {
        match self {
            Pass::Frame(s) => s.sample(world),
            Pass::Aligned { layer, width, values } => layer.contains(world).then(|| values[y * width + x]),
            Pass::Resampled { layer, grid, width, height, values } => {
                if !layer.contains(world) {
                    return None;
                }
                let v = grid
                    .index_of(world)
                    .filter(|&(i, j)| i < *width && j < *height)
                    .map_or(0.0, |(i, j)| values[j * width + i]);
                Some(v)
            }
        }
    }
}

/// Splat raster covering the part of `layer` inside the camera view.
fn camera_splats<'a>(layer: &'a ParticleLayer, camera: &Camera) -> Option<Pass<'a>> {
    let (vlo, vhi) = view_bounds(camera);
    let (llo, lhi) = layer.bounds();
    let (lo, hi) = (vlo.max(llo), vhi.min(lhi));
    if !(lo.x < hi.x && lo.y < hi.y) {
        return None;
    }
    let ps = camera.world_units_per_pixel();
    let grid = PixelGrid::new(DVec2::new(lo.x, hi.y), ps);
    let width = ((hi.x - lo.x) / ps).ceil() as usize + 1;
    let height = ((hi.y - lo.y) / ps).ceil() as usize + 1;
    let values = layer.splat(&grid, width, height);
    Some(Pass::Resampled { layer, grid, width, height, values })
}

/// Draw `layers` (bottom first) into `fb` as seen by `camera`.
///
/// The framebuffer is cleared first. The camera viewport should match the
/// framebuffer size.
pub fn render_layers(camera: &Camera, layers: &[RenderLayer], fb: &mut Framebuffer) {
    let passes: Vec<_> = layers
        .iter()
        .filter(|l| l.is_visible())
        .filter_map(|l| {
            let pass = match l.source {
                LayerSource::Frame(f) => Pass::Frame(f.sampler()),
                LayerSource::Particles(p) => camera_splats(p, camera)?,
            };
            Some((l, pass))
        })
        .collect();
    rasterise(fb, &passes, |x, y| {
        camera.cursor_to_world_position(DVec2::new(x as f64 + 0.5, y as f64 + 0.5))
    });
}

/// Draw `layers` with framebuffer pixel `(x, y)` centred at `grid.centre(x, y)`.
pub fn render_grid(grid: &PixelGrid, layers: &[RenderLayer], fb: &mut Framebuffer) {
    let (w, h) = (fb.width, fb.height);
    let passes: Vec<_> = layers
        .iter()
        .filter(|l| l.is_visible())
        .map(|l| {
            let pass = match l.source {
                LayerSource::Frame(f) => Pass::Frame(f.sampler()),
                LayerSource::Particles(p) => Pass::Aligned { layer: p, width: w, values: p.splat(grid, w, h) },
            };
            (l, pass)
        })
        .collect();
    rasterise(fb, &passes, |x, y| grid.centre(x, y));
}

fn rasterise(fb: &mut Framebuffer, passes: &[(&RenderLayer, Pass)], world_at: impl Fn(usize, usize) -> DVec2 + Sync) {
    fb.clear();
    let w = fb.width;
    if passes.is_empty() || w == 0 {
        return;
    }

    fb.rgb
        .par_chunks_mut(w * 3)
        .zip(fb.occupied.par_chunks_mut(w))
        .enumerate()
        .for_each(|(y, (rgb_row, occ_row))| {
            for x in 0..w {
                let world = world_at(x, y);
                let dst = &mut rgb_row[x * 3..x * 3 + 3];
                for (layer, pass) in passes {
                    if let Some(v) = pass.sample(x, y, world) {
                        blend_rgb(dst, layer.lut.map(v), layer.opacity, layer.blend_mode);
                        occ_row[x] = true;
                    }
                }
            }
        });
}
