//! Layer blending for the software renderer.
//!
//! Every layer is drawn over the framebuffer with
//! `result = bottom * (1 - a) + blend(bottom, top) * a`, where `a` is the
//! layer opacity. Channels are clamped to `[0, 1]` before blending.

use serde::{Deserialize, Serialize};

/// Supported blend modes for layer compositing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Subtract,
    Multiply,
    Max,
    Min,
    Screen,
}

impl BlendMode {
    pub const ALL: [BlendMode; 7] = [
        BlendMode::Normal,
        BlendMode::Add,
        BlendMode::Subtract,
        BlendMode::Multiply,
        BlendMode::Max,
        BlendMode::Min,
        BlendMode::Screen,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Add => "add",
            BlendMode::Subtract => "subtract",
            BlendMode::Multiply => "multiply",
            BlendMode::Max => "max",
            BlendMode::Min => "min",
            BlendMode::Screen => "screen",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name().eq_ignore_ascii_case(name))
    }

    /// Blend one channel of `top` over `bottom`.
    #[inline]
    pub fn apply(self, bottom: f32, top: f32) -> f32 {
        let b = bottom.clamp(0.0, 1.0);
        let t = top.clamp(0.0, 1.0);
        match self {
            BlendMode::Normal => t,
            BlendMode::Add => (b + t).min(1.0),
            BlendMode::Subtract => (b - t).max(0.0),
            BlendMode::Multiply => b * t,
            BlendMode::Max => b.max(t),
            BlendMode::Min => b.min(t),
            BlendMode::Screen => 1.0 - (1.0 - b) * (1.0 - t),
        }
    }
}

/// Composite an RGB sample over `dst` in place.
#[inline]
pub fn blend_rgb(dst: &mut [f32], src: [f32; 3], opacity: f32, mode: BlendMode) {
    debug_assert_eq!(dst.len(), 3);
    let a = opacity.clamp(0.0, 1.0);
    let inv = 1.0 - a;
    for (d, s) in dst.iter_mut().zip(src) {
        *d = *d * inv + mode.apply(*d, s) * a;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_full_opacity_replaces() {
        let mut px = [0.2, 0.4, 0.6];
        blend_rgb(&mut px, [1.0, 0.0, 0.5], 1.0, BlendMode::Normal);
        assert_eq!(px, [1.0, 0.0, 0.5]);
    }

    #[test]
    fn test_add_clamps_and_half_opacity() {
        let mut px = [0.5, 0.5, 0.5];
        blend_rgb(&mut px, [1.0, 0.25, 0.0], 1.0, BlendMode::Add);
        assert_eq!(px, [1.0, 0.75, 0.5]);

        let mut px = [0.0, 0.0, 0.0];
        blend_rgb(&mut px, [1.0, 1.0, 1.0], 0.5, BlendMode::Normal);
        assert_eq!(px, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_name_roundtrip() {
        for m in BlendMode::ALL {
            assert_eq!(BlendMode::from_name(m.name()), Some(m));
        }
        assert_eq!(BlendMode::from_name("MAX"), Some(BlendMode::Max));
        assert_eq!(BlendMode::from_name("dodge"), None);
    }
}
