//! Rectangular regions of interest in pixel space.
//!
//! Convention used everywhere in the crate:
//! - `x` is the column, `y` is the row.
//! - bounds are half-open on the max side: `x_min <= x < x_max`.
//! - pixel buffers are row-major, element `(x, y)` lives at `y * width + x`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Roi {
    pub x_min: usize,
    pub y_min: usize,
    pub x_max: usize,
    pub y_max: usize,
}

impl Roi {
    pub fn new(x_min: usize, y_min: usize, x_max: usize, y_max: usize) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    /// ROI covering a whole `width x height` buffer.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Build from `[x_min, y_min, x_max, y_max]`.
    pub fn from_array(a: [usize; 4]) -> Self {
        Self::new(a[0], a[1], a[2], a[3])
    }

    pub fn to_array(self) -> [usize; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }

    pub fn width(&self) -> usize {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> usize {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Non-empty and fully inside a `width x height` buffer.
    pub fn fits(&self, width: usize, height: usize) -> bool {
        !self.is_empty() && self.x_max <= width && self.y_max <= height
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x_min && x < self.x_max && y >= self.y_min && y < self.y_max
    }

    /// Shrink to the part that lies inside a `width x height` buffer.
    pub fn clamp_to(&self, width: usize, height: usize) -> Self {
        Self::new(
            self.x_min.min(width),
            self.y_min.min(height),
            self.x_max.min(width).max(self.x_min.min(width)),
            self.y_max.min(height).max(self.y_min.min(height)),
        )
    }

    /// Buffer index range of row `y` (absolute row) inside this ROI.
    #[inline]
    pub(crate) fn row_span(&self, y: usize, buffer_width: usize) -> std::ops::Range<usize> {
        let start = y * buffer_width + self.x_min;
        start..start + self.width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_half_open() {
        let roi = Roi::new(2, 3, 6, 4);
        assert_eq!(roi.width(), 4);
        assert_eq!(roi.height(), 1);
        assert!(roi.contains(5, 3));
        assert!(!roi.contains(6, 3));
        assert!(!roi.contains(2, 4));
    }

    #[test]
    fn test_fits_rejects_empty_and_oob() {
        assert!(Roi::new(0, 0, 10, 10).fits(10, 10));
        assert!(!Roi::new(0, 0, 11, 10).fits(10, 10));
        assert!(!Roi::new(4, 4, 4, 8).fits(10, 10));
        assert!(!Roi::new(6, 0, 5, 3).fits(10, 10));
    }

    #[test]
    fn test_clamp_to() {
        let r = Roi::new(5, 5, 20, 8).clamp_to(10, 10);
        assert_eq!(r, Roi::new(5, 5, 10, 8));
    }
}
