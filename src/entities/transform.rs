//! 2D affine pose of a frame or gizmo.
//!
//! Uses glam::DMat4 in Y-up world space (nm).
//! Forward transform (local -> world):
//! world = translation + R(rotation) * scale * local
//!
//! Rotation sign: counter-clockwise positive, degrees.
//! The matrix is always built from the scalar fields on request, so there
//! is no cached matrix to go stale.

use glam::{DMat4, DVec2, DVec3};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: [f64; 2],
    /// Degrees, CCW positive.
    pub rotation: f64,
    /// Uniform scale. Zero is accepted and yields a singular matrix.
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self { translation: [0.0, 0.0], rotation: 0.0, scale: 1.0 }
    }
}

impl Transform {
    pub fn new(translation: [f64; 2], rotation: f64, scale: f64) -> Self {
        Self { translation, rotation, scale }
    }

    #[inline]
    pub fn translation_vec(&self) -> DVec2 {
        DVec2::from(self.translation)
    }

    /// `Translate(tx, ty) · Rotate(θ) · Scale(s)`.
    pub fn matrix(&self) -> DMat4 {
        self.matrix_no_scale() * DMat4::from_scale(DVec3::new(self.scale, self.scale, 1.0))
    }

    /// `Translate(tx, ty) · Rotate(θ)`: places constant-size children (gizmo icons).
    pub fn matrix_no_scale(&self) -> DMat4 {
        DMat4::from_translation(self.translation_vec().extend(0.0))
            * DMat4::from_rotation_z(self.rotation.to_radians())
    }

    /// Local -> world.
    #[inline]
    pub fn apply(&self, local: DVec2) -> DVec2 {
        self.translation_vec() + DVec2::from_angle(self.rotation.to_radians()).rotate(local * self.scale)
    }

    /// World -> local. Degenerates (inf/NaN) when scale is 0.
    #[inline]
    pub fn inverse_apply(&self, world: DVec2) -> DVec2 {
        DVec2::from_angle(-self.rotation.to_radians()).rotate(world - self.translation_vec()) / self.scale
    }

    pub fn translate(&mut self, delta: DVec2) {
        self.translation = (self.translation_vec() + delta).to_array();
    }

    /// Rotate by `degrees` about a world-space pivot.
    pub fn pivoted_rotation(&mut self, pivot: DVec2, degrees: f64) {
        let offset = self.translation_vec() - pivot;
        self.translation = (pivot + DVec2::from_angle(degrees.to_radians()).rotate(offset)).to_array();
        self.rotation += degrees;
    }

    /// Scale by `factor` about a world-space pivot.
    pub fn pivoted_scale(&mut self, pivot: DVec2, factor: f64) {
        let offset = self.translation_vec() - pivot;
        self.translation = (pivot + offset * factor).to_array();
        self.scale *= factor;
    }

    pub fn is_identity(&self) -> bool {
        self.translation == [0.0, 0.0] && self.rotation == 0.0 && self.scale == 1.0
    }
}

impl Add for Transform {
    type Output = Transform;

    fn add(self, rhs: Transform) -> Transform {
        Transform {
            translation: [self.translation[0] + rhs.translation[0], self.translation[1] + rhs.translation[1]],
            rotation: self.rotation + rhs.rotation,
            scale: self.scale * rhs.scale,
        }
    }
}

/// `b - a` is the pose of `b` relative to `a`.
impl Sub for Transform {
    type Output = Transform;

    fn sub(self, rhs: Transform) -> Transform {
        Transform {
            translation: [self.translation[0] - rhs.translation[0], self.translation[1] - rhs.translation[1]],
            rotation: self.rotation - rhs.rotation,
            scale: self.scale / rhs.scale,
        }
    }
}
