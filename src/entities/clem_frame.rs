//! Image placed in the correlation editor's world space.
//!
//! A `ClemFrame` owns its pixels, a [`Transform`] (local -> world), a pivot
//! used for interactive rotation and scaling, and display settings (LUT,
//! opacity, blend mode). Frames can be parented: children follow every
//! translate/rotate/scale applied to the parent through the editor.

use glam::{DMat4, DVec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::frame::{Frame, FrameError, compute_stats};
use super::space::{self, Quad};
use super::transform::Transform;
use crate::editor::compositor::BlendMode;

/// Lookup table: raw value -> tinted RGB in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lut {
    pub tint: [f32; 3],
    pub contrast_min: f32,
    pub contrast_max: f32,
}

impl Default for Lut {
    fn default() -> Self {
        Self::grayscale(0.0, 1.0)
    }
}

impl Lut {
    pub fn grayscale(contrast_min: f32, contrast_max: f32) -> Self {
        Self { tint: [1.0, 1.0, 1.0], contrast_min, contrast_max }
    }

    /// Contrast limits set to the pixel range.
    pub fn auto_contrast(pixels: &[f32], tint: [f32; 3]) -> Self {
        let stats = compute_stats(pixels);
        Self { tint, contrast_min: stats.min, contrast_max: stats.max }
    }

    /// Normalised intensity in `[0, 1]`.
    #[inline]
    pub fn level(&self, value: f32) -> f32 {
        let range = self.contrast_max - self.contrast_min;
        if range.abs() <= f32::EPSILON {
            return if value > self.contrast_min { 1.0 } else { 0.0 };
        }
        ((value - self.contrast_min) / range).clamp(0.0, 1.0)
    }

    #[inline]
    pub fn map(&self, value: f32) -> [f32; 3] {
        let l = self.level(value);
        [self.tint[0] * l, self.tint[1] * l, self.tint[2] * l]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClemFrame {
    pub id: Uuid,
    pub title: String,
    pixels: Vec<f32>,
    width: usize,
    height: usize,
    /// nm per pixel.
    pub pixel_size: f64,
    pub transform: Transform,
    /// World-space point for pivoted rotation/scale.
    pub pivot: [f64; 2],
    pub lut: Lut,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub hide: bool,
    pub locked: bool,
    pub parent: Option<Uuid>,
    pub children: Vec<Uuid>,
}

impl ClemFrame {
    pub fn new(
        title: impl Into<String>,
        width: usize,
        height: usize,
        pixels: Vec<f32>,
        pixel_size: f64,
    ) -> Result<Self, FrameError> {
        if pixels.len() != width * height {
            return Err(FrameError::SizeMismatch { expected: width * height, actual: pixels.len() });
        }
        let lut = Lut::auto_contrast(&pixels, [1.0, 1.0, 1.0]);
        Ok(Self {
            id: Uuid::new_v4(),
            title: title.into(),
            pixels,
            width,
            height,
            pixel_size,
            transform: Transform::default(),
            pivot: [0.0, 0.0],
            lut,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            hide: false,
            locked: false,
            parent: None,
            children: Vec::new(),
        })
    }

    /// Snapshot a dataset frame (loads it if needed).
    pub fn from_frame(title: impl Into<String>, frame: &Frame) -> Result<Self, FrameError> {
        let (w, h, pixels) = frame.with_pixels(|px, w, h| (w, h, px.to_vec()))?;
        Self::new(title, w, h, pixels, frame.pixel_size)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Physical size `(w·ps, h·ps)` in nm before the transform.
    pub fn extent(&self) -> DVec2 {
        DVec2::new(self.width as f64 * self.pixel_size, self.height as f64 * self.pixel_size)
    }

    /// Largest world-space dimension, including the transform scale.
    pub fn world_extent(&self) -> f64 {
        self.extent().max_element() * self.transform.scale.abs()
    }

    /// Corners in local space (centered, Y-up): TL, TR, BR, BL.
    pub fn local_corners(&self) -> [DVec2; 4] {
        let h = self.extent() * 0.5;
        [
            DVec2::new(-h.x, h.y),
            DVec2::new(h.x, h.y),
            DVec2::new(h.x, -h.y),
            DVec2::new(-h.x, -h.y),
        ]
    }

    pub fn world_corners(&self) -> [DVec2; 4] {
        self.local_corners().map(|c| self.transform.apply(c))
    }

    pub fn quad(&self) -> Quad {
        Quad::new(self.world_corners())
    }

    /// World point inside the frame outline.
    pub fn contains(&self, world: DVec2) -> bool {
        self.quad().contains(world)
    }

    pub fn pivot_vec(&self) -> DVec2 {
        DVec2::from(self.pivot)
    }

    /// Move the pivot back to the frame centre.
    pub fn reset_pivot(&mut self) {
        self.pivot = self.transform.translation;
    }

    /// Sampler with the inverse model matrix precomputed.
    ///
    /// A singular transform (scale 0) yields a sampler that covers nothing.
    pub fn sampler(&self) -> FrameSampler<'_> {
        let model = self.transform.matrix();
        let world_to_local = (model.determinant() != 0.0).then(|| model.inverse());
        FrameSampler { frame: self, world_to_local }
    }

    pub fn translate(&mut self, delta: DVec2) {
        self.transform.translate(delta);
        self.pivot = (self.pivot_vec() + delta).to_array();
    }

    /// Rotate the frame and its pivot about `center` (world).
    pub fn rotate_about(&mut self, center: DVec2, degrees: f64) {
        self.transform.pivoted_rotation(center, degrees);
        let offset = self.pivot_vec() - center;
        self.pivot = (center + DVec2::from_angle(degrees.to_radians()).rotate(offset)).to_array();
    }

    /// Scale the frame and its pivot about `center` (world).
    pub fn scale_about(&mut self, center: DVec2, factor: f64) {
        self.transform.pivoted_scale(center, factor);
        self.pivot = (center + (self.pivot_vec() - center) * factor).to_array();
    }

    pub fn apply_pivoted_rotation(&mut self, degrees: f64) {
        self.rotate_about(self.pivot_vec(), degrees);
    }

    pub fn apply_pivoted_scale(&mut self, factor: f64) {
        self.scale_about(self.pivot_vec(), factor);
    }
}

/// Nearest-neighbour lookup of world points into a frame.
pub struct FrameSampler<'a> {
    frame: &'a ClemFrame,
    world_to_local: Option<DMat4>,
}

impl FrameSampler<'_> {
    /// Raw pixel value under a world point, `None` outside the frame.
    #[inline]
    pub fn sample(&self, world: DVec2) -> Option<f32> {
        let f = self.frame;
        let local = self.world_to_local?.transform_point3(world.extend(0.0)).truncate();
        let p = space::local_to_pixel(local, (f.width, f.height), f.pixel_size);
        let (x, y) = (p.x.floor(), p.y.floor());
        // Inside test; NaN fails it.
        if !(x >= 0.0 && y >= 0.0 && x < f.width as f64 && y < f.height as f64) {
            return None;
        }
        Some(f.pixels[y as usize * f.width + x as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: DVec2, b: DVec2) {
        assert!((a - b).length() < 1e-9, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_transformed_corners_analytic() {
        let mut source = Frame::from_pixels(100, 100, vec![0.0; 100 * 100]).unwrap();
        source.pixel_size = 10.0;
        let mut frame = ClemFrame::from_frame("em", &source).unwrap();
        frame.transform = Transform::new([50.0, 0.0], 90.0, 2.0);

        // 100 px * 10 nm = 1000 nm box centred on the origin; rotate 90 CCW,
        // double, then shift by (50, 0).
        let c = frame.world_corners();
        assert_close(c[0], DVec2::new(-950.0, -1000.0)); // TL (-500, 500)
        assert_close(c[1], DVec2::new(-950.0, 1000.0)); // TR (500, 500)
        assert_close(c[2], DVec2::new(1050.0, 1000.0)); // BR (500, -500)
        assert_close(c[3], DVec2::new(1050.0, -1000.0)); // BL (-500, -500)
    }

    #[test]
    fn test_sampler_follows_transform() {
        // 2x2 frame: row 0 = [1, 2], row 1 = [3, 4].
        let mut f = ClemFrame::new("s", 2, 2, vec![1.0, 2.0, 3.0, 4.0], 1.0).unwrap();
        let s = f.sampler();
        assert_eq!(s.sample(DVec2::new(-0.5, 0.5)), Some(1.0));
        assert_eq!(s.sample(DVec2::new(0.5, -0.5)), Some(4.0));
        assert_eq!(s.sample(DVec2::new(1.5, 0.0)), None);

        f.transform.translate(DVec2::new(10.0, 0.0));
        let s = f.sampler();
        assert_eq!(s.sample(DVec2::new(9.5, 0.5)), Some(1.0));
        assert_eq!(s.sample(DVec2::new(-0.5, 0.5)), None);
    }

    #[test]
    fn test_zero_scale_frame_covers_nothing() {
        let mut f = ClemFrame::new("z", 2, 2, vec![1.0; 4], 1.0).unwrap();
        f.transform.scale = 0.0;
        let s = f.sampler();
        assert_eq!(s.sample(DVec2::new(1e6, 1e6)), None);
        assert_eq!(s.sample(DVec2::ZERO), None);
        assert_eq!(s.sample(DVec2::new(0.25, -0.25)), None);
    }

    #[test]
    fn test_pivoted_rotation_keeps_pivot() {
        let mut f = ClemFrame::new("p", 10, 10, vec![0.0; 100], 1.0).unwrap();
        f.pivot = [5.0, 5.0]; // top-right corner
        f.apply_pivoted_rotation(90.0);
        assert_close(f.pivot_vec(), DVec2::new(5.0, 5.0));
        assert_close(f.world_corners()[1], DVec2::new(5.0, 5.0));
        assert_close(f.transform.translation_vec(), DVec2::new(10.0, 0.0));
    }

    #[test]
    fn test_lut_levels() {
        let lut = Lut { tint: [1.0, 0.5, 0.0], contrast_min: 10.0, contrast_max: 20.0 };
        assert_eq!(lut.map(15.0), [0.5, 0.25, 0.0]);
        assert_eq!(lut.level(5.0), 0.0);
        assert_eq!(lut.level(25.0), 1.0);
        let flat = Lut::auto_contrast(&[3.0, 3.0], [1.0; 3]);
        assert_eq!(flat.level(3.0), 0.0);
    }
}
