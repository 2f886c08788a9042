//! Coordinate space conversions for the correlation editor.
//!
//! ## Coordinate Spaces
//!
//! - **Pixel space**: origin top-left of a frame, +Y down, units = pixels.
//!   Column/row indexing of frame buffers.
//!
//! - **Local space**: origin at the frame centre, +Y up, units = nm.
//!   A frame's corners sit at `(±w·ps/2, ±h·ps/2)` before its transform.
//!
//! - **World space**: local space mapped through the frame [`Transform`](super::transform::Transform).
//!   Shared by all frames, gizmos and the camera.
//!
//! - **Cursor space**: origin top-left of the viewport, +Y down, screen pixels.
//!
//! - **NDC**: `[-1, 1]` on both axes, +Y up.
//!
//! ```text
//! Cursor ──cursor_to_ndc──► NDC ──inverse VP──► World ──inverse model──► Local ──local_to_pixel──► Pixel
//! ```

use glam::DVec2;

// =============================================================================
// Pixel <-> Local (centered, Y-up, nm)
// =============================================================================

/// Pixel position -> local position (nm).
///
/// - Pixel (0, 0) = top-left -> Local (-w·ps/2, h·ps/2)
/// - Pixel (w, h) = bottom-right -> Local (w·ps/2, -h·ps/2)
#[inline]
pub fn pixel_to_local(p: DVec2, size: (usize, usize), pixel_size: f64) -> DVec2 {
    let w = size.0 as f64;
    let h = size.1 as f64;
    DVec2::new((p.x - w * 0.5) * pixel_size, (h * 0.5 - p.y) * pixel_size)
}

/// Local position (nm) -> pixel position. Inverse of [`pixel_to_local`].
#[inline]
pub fn local_to_pixel(p: DVec2, size: (usize, usize), pixel_size: f64) -> DVec2 {
    let w = size.0 as f64;
    let h = size.1 as f64;
    DVec2::new(p.x / pixel_size + w * 0.5, h * 0.5 - p.y / pixel_size)
}

// =============================================================================
// Cursor <-> NDC
// =============================================================================

#[inline]
pub fn cursor_to_ndc(cursor: DVec2, viewport: DVec2) -> DVec2 {
    DVec2::new(2.0 * cursor.x / viewport.x - 1.0, 1.0 - 2.0 * cursor.y / viewport.y)
}

#[inline]
pub fn ndc_to_cursor(ndc: DVec2, viewport: DVec2) -> DVec2 {
    DVec2::new((ndc.x + 1.0) * 0.5 * viewport.x, (1.0 - ndc.y) * 0.5 * viewport.y)
}

// =============================================================================
// Rotated rectangle
// =============================================================================

/// Four corners of a (possibly rotated) rectangle, in order around the edge.
///
/// Used for frame picking and gizmo hit tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub corners: [DVec2; 4],
}

impl Quad {
    pub fn new(corners: [DVec2; 4]) -> Self {
        Self { corners }
    }

    /// Axis aligned square of half-size `half` around `center`.
    pub fn square(center: DVec2, half: f64) -> Self {
        Self::new([
            center + DVec2::new(-half, half),
            center + DVec2::new(half, half),
            center + DVec2::new(half, -half),
            center + DVec2::new(-half, -half),
        ])
    }

    /// Point-in-rectangle via projections onto the two edge vectors.
    ///
    /// `p` is inside when `0 <= (p-a)·ab <= ab·ab` and `0 <= (p-a)·ad <= ad·ad`.
    pub fn contains(&self, p: DVec2) -> bool {
        let [a, b, _, d] = self.corners;
        let ab = b - a;
        let ad = d - a;
        let ap = p - a;
        let u = ap.dot(ab);
        let v = ap.dot(ad);
        (0.0..=ab.dot(ab)).contains(&u) && (0.0..=ad.dot(ad)).contains(&v)
    }

    pub fn center(&self) -> DVec2 {
        self.corners.iter().copied().sum::<DVec2>() * 0.25
    }

    /// Axis aligned bounds `(min, max)`.
    pub fn bounds(&self) -> (DVec2, DVec2) {
        self.corners.iter().fold(
            (DVec2::splat(f64::INFINITY), DVec2::splat(f64::NEG_INFINITY)),
            |(lo, hi), c| (lo.min(*c), hi.max(*c)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_local_roundtrip() {
        let size = (100, 60);
        let p = DVec2::new(13.5, 47.25);
        let local = pixel_to_local(p, size, 10.0);
        let back = local_to_pixel(local, size, 10.0);
        assert!((back - p).length() < 1e-12);
        assert_eq!(pixel_to_local(DVec2::ZERO, size, 10.0), DVec2::new(-500.0, 300.0));
    }

    #[test]
    fn test_ndc_corners() {
        let vp = DVec2::new(800.0, 600.0);
        assert_eq!(cursor_to_ndc(DVec2::ZERO, vp), DVec2::new(-1.0, 1.0));
        assert_eq!(cursor_to_ndc(vp, vp), DVec2::new(1.0, -1.0));
        assert_eq!(ndc_to_cursor(DVec2::ZERO, vp), DVec2::new(400.0, 300.0));
    }

    #[test]
    fn test_rotated_quad_contains() {
        // Diamond: square rotated by 45 degrees.
        let q = Quad::new([
            DVec2::new(0.0, 1.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(0.0, -1.0),
            DVec2::new(-1.0, 0.0),
        ]);
        assert!(q.contains(DVec2::ZERO));
        assert!(q.contains(DVec2::new(0.4, 0.4)));
        assert!(!q.contains(DVec2::new(0.6, 0.6)));
        assert!(!q.contains(DVec2::new(0.9, -0.9)));
    }
}
