//! Single 2D microscopy frame with lazily loaded pixels.
//!
//! Pixels are single-channel `f32` (raw detector counts), row-major,
//! indexed as `y * width + x` (see [`Roi`] for the slicing convention).
//!
//! # Lazy loading
//!
//! A frame created from a file starts in [`FrameStatus::Header`]. The first
//! `load()` decodes the file while holding the data mutex, so concurrent
//! consumers block until the decode finishes and the file is read at most
//! once per `Frame` instance. Later calls return the cached buffer.
//!
//! # Cloning
//!
//! `Clone` is deep: pixels and metadata are copied, so a processing node can
//! mutate its copy without touching the upstream cache.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::image_io;
use super::roi::Roi;
use crate::config::DEFAULT_PIXEL_SIZE;

/// Frame loading status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Header,  // Path set, pixels not decoded yet
    Loaded,  // Pixels available
    Error,   // Decoding failed
}

/// Frame errors
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    Image(String),
    NoSource,
    PreviouslyFailed(PathBuf),
    RoiOutOfBounds { roi: Roi, width: usize, height: usize },
    SizeMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Image(e) => write!(f, "Image error: {}", e),
            FrameError::NoSource => write!(f, "Frame has neither pixels nor a source path"),
            FrameError::PreviouslyFailed(p) => write!(f, "Loading {} failed earlier", p.display()),
            FrameError::RoiOutOfBounds { roi, width, height } => write!(
                f,
                "ROI [{}, {}, {}, {}] is empty or outside {}x{} frame",
                roi.x_min, roi.y_min, roi.x_max, roi.y_max, width, height
            ),
            FrameError::SizeMismatch { expected, actual } => {
                write!(f, "Expected {} values, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for FrameError {}

#[derive(Debug, Clone)]
struct FrameData {
    pixels: Vec<f32>,
    width: usize,
    height: usize,
    status: FrameStatus,
}

/// Summary statistics of a frame's pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub mean: f64,
    pub std: f64,
    pub min: f32,
    pub max: f32,
}

#[derive(Debug)]
pub struct Frame {
    data: Mutex<FrameData>,
    path: Option<PathBuf>,
    /// Page of `path` for multi-page files.
    page: usize,
    /// Position of this frame in its dataset.
    pub index: usize,
    /// Physical pixel size in nm.
    pub pixel_size: f64,
    pub discard: bool,
    pub scalar_metrics: IndexMap<String, f64>,
    /// Detected particle positions `[x, y]` in pixel units.
    pub maxima: Vec<[f64; 2]>,
}

impl Clone for Frame {
    fn clone(&self) -> Self {
        Self {
            data: Mutex::new(self.lock().clone()),
            path: self.path.clone(),
            page: self.page,
            index: self.index,
            pixel_size: self.pixel_size,
            discard: self.discard,
            scalar_metrics: self.scalar_metrics.clone(),
            maxima: self.maxima.clone(),
        }
    }
}

impl Frame {
    /// In-memory frame from row-major pixels.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self, FrameError> {
        if pixels.len() != width * height {
            return Err(FrameError::SizeMismatch { expected: width * height, actual: pixels.len() });
        }
        Ok(Self::with_data(
            FrameData { pixels, width, height, status: FrameStatus::Loaded },
            None,
        ))
    }

    /// Zero-filled in-memory frame.
    pub fn zeros(width: usize, height: usize) -> Self {
        Self::with_data(
            FrameData { pixels: vec![0.0; width * height], width, height, status: FrameStatus::Loaded },
            None,
        )
    }

    /// Frame backed by a file; pixels are decoded on first `load()`.
    pub fn from_file(path: impl Into<PathBuf>, index: usize) -> Self {
        Self::from_file_page(path, 0, index)
    }

    /// Frame backed by page `page` of a multi-page file.
    pub fn from_file_page(path: impl Into<PathBuf>, page: usize, index: usize) -> Self {
        let mut frame = Self::with_data(
            FrameData { pixels: Vec::new(), width: 0, height: 0, status: FrameStatus::Header },
            Some(path.into()),
        );
        frame.page = page;
        frame.index = index;
        frame
    }

    fn with_data(data: FrameData, path: Option<PathBuf>) -> Self {
        Self {
            data: Mutex::new(data),
            path,
            page: 0,
            index: 0,
            pixel_size: DEFAULT_PIXEL_SIZE,
            discard: false,
            scalar_metrics: IndexMap::new(),
            maxima: Vec::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn status(&self) -> FrameStatus {
        self.lock().status
    }

    pub fn is_loaded(&self) -> bool {
        self.status() == FrameStatus::Loaded
    }

    /// Width in pixels (0 until a file-backed frame is loaded).
    pub fn width(&self) -> usize {
        self.lock().width
    }

    pub fn height(&self) -> usize {
        self.lock().height
    }

    /// Decode pixels from disk if not done yet. Idempotent.
    pub fn load(&self) -> Result<(), FrameError> {
        let mut data = self.lock();
        match data.status {
            FrameStatus::Loaded => return Ok(()),
            FrameStatus::Error => {
                let path = self.path.clone().unwrap_or_default();
                return Err(FrameError::PreviouslyFailed(path));
            }
            FrameStatus::Header => {}
        }

        let path = self.path.as_ref().ok_or(FrameError::NoSource)?;
        match image_io::load_page(path, self.page) {
            Ok((w, h, pixels)) => {
                log::debug!(
                    "Loaded frame {} ({}x{}) from {} page {}",
                    self.index,
                    w,
                    h,
                    path.display(),
                    self.page
                );
                data.pixels = pixels;
                data.width = w;
                data.height = h;
                data.status = FrameStatus::Loaded;
                Ok(())
            }
            Err(e) => {
                data.status = FrameStatus::Error;
                Err(FrameError::Image(format!("{:#}", e)))
            }
        }
    }

    /// Reset transient per-run state. Pixels stay cached.
    pub fn clean(&mut self) {
        self.discard = false;
        self.maxima.clear();
    }

    /// Run `f` on the loaded pixels, loading first if needed.
    pub fn with_pixels<R>(&self, f: impl FnOnce(&[f32], usize, usize) -> R) -> Result<R, FrameError> {
        self.load()?;
        let data = self.lock();
        Ok(f(&data.pixels, data.width, data.height))
    }

    /// Mutable variant of [`Frame::with_pixels`].
    pub fn with_pixels_mut<R>(&mut self, f: impl FnOnce(&mut [f32], usize, usize) -> R) -> Result<R, FrameError> {
        self.load()?;
        let data = self.data.get_mut().unwrap_or_else(PoisonError::into_inner);
        let (w, h) = (data.width, data.height);
        Ok(f(&mut data.pixels, w, h))
    }

    /// Copy of the pixel buffer.
    pub fn pixels(&self) -> Result<Vec<f32>, FrameError> {
        self.with_pixels(|px, _, _| px.to_vec())
    }

    /// Replace the whole buffer (dimensions may change).
    pub fn set_pixels(&mut self, width: usize, height: usize, pixels: Vec<f32>) -> Result<(), FrameError> {
        if pixels.len() != width * height {
            return Err(FrameError::SizeMismatch { expected: width * height, actual: pixels.len() });
        }
        let data = self.data.get_mut().unwrap_or_else(PoisonError::into_inner);
        *data = FrameData { pixels, width, height, status: FrameStatus::Loaded };
        Ok(())
    }

    /// Copy of this frame's metadata with new pixels.
    pub fn derive(&self, width: usize, height: usize, pixels: Vec<f32>) -> Result<Frame, FrameError> {
        let mut out = Frame::from_pixels(width, height, pixels)?;
        out.path = self.path.clone();
        out.page = self.page;
        out.index = self.index;
        out.pixel_size = self.pixel_size;
        out.discard = self.discard;
        out.scalar_metrics = self.scalar_metrics.clone();
        out.maxima = self.maxima.clone();
        Ok(out)
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        let data = self.lock();
        (x < data.width && y < data.height).then(|| data.pixels[y * data.width + x])
    }

    /// Read the pixels inside `roi` (row-major, `roi.width()` per row).
    pub fn load_roi(&self, roi: Roi) -> Result<Vec<f32>, FrameError> {
        self.with_pixels(|px, w, h| {
            if !roi.fits(w, h) {
                return Err(FrameError::RoiOutOfBounds { roi, width: w, height: h });
            }
            let mut out = Vec::with_capacity(roi.area());
            for y in roi.y_min..roi.y_max {
                out.extend_from_slice(&px[roi.row_span(y, w)]);
            }
            Ok(out)
        })?
    }

    /// Overwrite the pixels inside `roi` with `values` (row-major).
    pub fn write_roi(&mut self, roi: Roi, values: &[f32]) -> Result<(), FrameError> {
        self.with_pixels_mut(|px, w, h| {
            if !roi.fits(w, h) {
                return Err(FrameError::RoiOutOfBounds { roi, width: w, height: h });
            }
            if values.len() != roi.area() {
                return Err(FrameError::SizeMismatch { expected: roi.area(), actual: values.len() });
            }
            for (row, y) in (roi.y_min..roi.y_max).enumerate() {
                let src = &values[row * roi.width()..(row + 1) * roi.width()];
                px[roi.row_span(y, w)].copy_from_slice(src);
            }
            Ok(())
        })?
    }

    /// New frame containing only `roi`; maxima are shifted and filtered.
    ///
    /// Maxima with negative or non-finite coordinates are rejected as out of bounds.
    pub fn crop(&self, roi: Roi) -> Result<Frame, FrameError> {
        let pixels = self.load_roi(roi)?;
        let valid = |m: &[f64; 2]| m.iter().all(|c| c.is_finite() && *c >= 0.0);
        if !self.maxima.iter().all(valid) {
            return Err(FrameError::RoiOutOfBounds { roi, width: self.width(), height: self.height() });
        }
        let mut out = self.derive(roi.width(), roi.height(), pixels)?;
        out.maxima = self
            .maxima
            .iter()
            .filter(|m| roi.contains(m[0] as usize, m[1] as usize))
            .map(|m| [m[0] - roi.x_min as f64, m[1] - roi.y_min as f64])
            .collect();
        Ok(out)
    }

    pub fn stats(&self) -> Result<FrameStats, FrameError> {
        self.with_pixels(|px, _, _| compute_stats(px))
    }
}

pub(crate) fn compute_stats(px: &[f32]) -> FrameStats {
    if px.is_empty() {
        return FrameStats { mean: 0.0, std: 0.0, min: 0.0, max: 0.0 };
    }
    let n = px.len() as f64;
    let mean = px.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = px.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    let (min, max) = px
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    FrameStats { mean, std: var.sqrt(), min, max }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: usize, h: usize) -> Frame {
        Frame::from_pixels(w, h, (0..w * h).map(|v| v as f32).collect()).unwrap()
    }

    #[test]
    fn test_roi_write_then_load_roundtrip() {
        let mut frame = ramp(8, 6);
        let roi = Roi::new(2, 1, 5, 4);
        let data: Vec<f32> = (0..roi.area()).map(|v| 100.0 + v as f32).collect();

        frame.write_roi(roi, &data).unwrap();
        assert_eq!(frame.load_roi(roi).unwrap(), data);
        // Outside the ROI nothing changed: (x=1, y=1) is still the ramp value.
        assert_eq!(frame.get(1, 1), Some(9.0));
        // First ROI row starts at x=2, y=1.
        assert_eq!(frame.get(2, 1), Some(100.0));
    }

    #[test]
    fn test_roi_out_of_bounds_rejected() {
        let mut frame = ramp(4, 4);
        let roi = Roi::new(2, 2, 5, 4);
        assert!(matches!(frame.load_roi(roi), Err(FrameError::RoiOutOfBounds { .. })));
        assert!(matches!(frame.write_roi(roi, &[0.0; 6]), Err(FrameError::RoiOutOfBounds { .. })));
        assert!(matches!(
            frame.write_roi(Roi::new(0, 0, 2, 2), &[0.0; 3]),
            Err(FrameError::SizeMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_clone_is_deep() {
        let original = ramp(3, 3);
        let mut copy = original.clone();
        copy.with_pixels_mut(|px, _, _| px.fill(-1.0)).unwrap();
        assert_eq!(original.get(1, 1), Some(4.0));
        assert_eq!(copy.get(1, 1), Some(-1.0));
    }

    #[test]
    fn test_clean_keeps_pixels() {
        let mut frame = ramp(2, 2);
        frame.discard = true;
        frame.maxima.push([1.0, 1.0]);
        frame.clean();
        assert!(!frame.discard);
        assert!(frame.maxima.is_empty());
        assert_eq!(frame.get(1, 1), Some(3.0));
    }

    #[test]
    fn test_load_reads_file_once() {
        let path = std::env::temp_dir().join(format!("scnodes-frame-{}.tif", uuid::Uuid::new_v4()));
        image_io::save_tiff_counts(&path, 3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        let frame = std::sync::Arc::new(Frame::from_file(&path, 0));
        assert_eq!(frame.status(), FrameStatus::Header);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let f = frame.clone();
                std::thread::spawn(move || f.load())
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        // File gone: cached pixels are still served.
        std::fs::remove_file(&path).unwrap();
        frame.load().unwrap();
        assert_eq!(frame.get(2, 1), Some(6.0));
        assert_eq!((frame.width(), frame.height()), (3, 2));
    }

    #[test]
    fn test_missing_file_errors_once_then_sticks() {
        let frame = Frame::from_file("/nonexistent/scnodes.tif", 0);
        assert!(matches!(frame.load(), Err(FrameError::Image(_))));
        assert!(matches!(frame.load(), Err(FrameError::PreviouslyFailed(_))));
    }

    #[test]
    fn test_crop_shifts_maxima() {
        let mut frame = ramp(10, 10);
        frame.maxima = vec![[5.0, 5.0], [1.0, 1.0]];
        let cropped = frame.crop(Roi::new(4, 4, 8, 8)).unwrap();
        assert_eq!(cropped.width(), 4);
        assert_eq!(cropped.maxima, vec![[1.0, 1.0]]);
        assert_eq!(cropped.get(0, 0), Some(44.0));
    }

    #[test]
    fn test_crop_rejects_negative_maxima() {
        let mut frame = ramp(10, 10);
        frame.maxima = vec![[5.0, 5.0], [-1.0, 6.0]];
        assert!(matches!(frame.crop(Roi::new(4, 4, 8, 8)), Err(FrameError::RoiOutOfBounds { .. })));
        frame.maxima = vec![[f64::NAN, 5.0]];
        assert!(frame.crop(Roi::new(4, 4, 8, 8)).is_err());
    }

    #[test]
    fn test_file_page_is_kept_on_clone() {
        let frame = Frame::from_file_page("/data/stack.tif", 2, 7);
        assert_eq!(frame.page(), 2);
        assert_eq!(frame.clone().page(), 2);
        assert_eq!(frame.index, 7);
    }
}
