//! Ordered series of frames (time series or z-stack).
//!
//! `n_frames()` is always `frames.len()`; every mutation re-indexes the
//! frames and clamps the `current_frame` cursor.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::frame::Frame;
use super::image_io;
use crate::config::DEFAULT_PIXEL_SIZE;

#[derive(Debug, Clone)]
pub struct Dataset {
    frames: Vec<Frame>,
    current_frame: usize,
    pixel_size: f64,
    pub source: Option<PathBuf>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset {
    pub fn new() -> Self {
        Self { frames: Vec::new(), current_frame: 0, pixel_size: DEFAULT_PIXEL_SIZE, source: None }
    }

    /// Dataset from in-memory frames; all frames take `pixel_size`.
    pub fn from_frames(frames: Vec<Frame>, pixel_size: f64) -> Self {
        let mut ds = Self { frames, current_frame: 0, pixel_size, source: None };
        ds.set_pixel_size(pixel_size);
        ds.reindex();
        ds
    }

    /// Image file or directory of images (sorted by name). Every page of a
    /// multi-page TIFF becomes a frame. Pixels load lazily.
    pub fn from_path(path: &Path, pixel_size: f64) -> Result<Self> {
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && image_io::is_supported(p))
                .collect();
            files.sort();
            files
        } else if path.is_file() {
            if !image_io::is_supported(path) {
                bail!("Unsupported image format: {}", path.display());
            }
            vec![path.to_path_buf()]
        } else {
            bail!("No such file or directory: {}", path.display());
        };

        if files.is_empty() {
            bail!("No supported images in {}", path.display());
        }

        // Multi-page files contribute one frame per page.
        let mut frames = Vec::new();
        for file in files {
            let pages = image_io::page_count(&file)?;
            for page in 0..pages {
                frames.push(Frame::from_file_page(file.clone(), page, frames.len()));
            }
        }
        let mut ds = Self::from_frames(frames, pixel_size);
        ds.source = Some(path.to_path_buf());
        log::info!("Opened dataset {} ({} frames)", path.display(), ds.n_frames());
        Ok(ds)
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Frame> {
        self.frames.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Frame> {
        self.frames.get_mut(idx)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    pub fn set_pixel_size(&mut self, pixel_size: f64) {
        self.pixel_size = pixel_size;
        for f in &mut self.frames {
            f.pixel_size = pixel_size;
        }
    }

    pub fn push(&mut self, mut frame: Frame) {
        frame.pixel_size = self.pixel_size;
        frame.index = self.frames.len();
        self.frames.push(frame);
    }

    /// Insert at `idx` (clamped to the end).
    pub fn insert(&mut self, idx: usize, mut frame: Frame) {
        frame.pixel_size = self.pixel_size;
        let idx = idx.min(self.frames.len());
        self.frames.insert(idx, frame);
        self.reindex();
    }

    pub fn remove(&mut self, idx: usize) -> Option<Frame> {
        if idx >= self.frames.len() {
            return None;
        }
        let frame = self.frames.remove(idx);
        self.reindex();
        Some(frame)
    }

    /// Keep frames for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&Frame) -> bool) {
        self.frames.retain(keep);
        self.reindex();
    }

    /// Drop frames flagged `discard`; returns how many were removed.
    pub fn filter_discarded(&mut self) -> usize {
        let before = self.frames.len();
        self.retain(|f| !f.discard);
        before - self.frames.len()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn set_current_frame(&mut self, idx: usize) {
        self.current_frame = idx.min(self.frames.len().saturating_sub(1));
    }

    pub fn current(&self) -> Option<&Frame> {
        self.frames.get(self.current_frame)
    }

    fn reindex(&mut self) {
        for (i, f) in self.frames.iter_mut().enumerate() {
            f.index = i;
        }
        self.set_current_frame(self.current_frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> Dataset {
        let frames = (0..n)
            .map(|i| Frame::from_pixels(2, 2, vec![i as f32; 4]).unwrap())
            .collect();
        Dataset::from_frames(frames, 64.0)
    }

    #[test]
    fn test_count_tracks_mutations() {
        let mut ds = dataset(5);
        assert_eq!(ds.n_frames(), 5);

        ds.push(Frame::zeros(2, 2));
        assert_eq!(ds.n_frames(), 6);
        assert_eq!(ds.get(5).map(|f| f.index), Some(5));

        ds.insert(0, Frame::zeros(2, 2));
        assert_eq!(ds.n_frames(), 7);
        assert_eq!(ds.get(1).and_then(|f| f.get(0, 0)), Some(0.0));
        assert!(ds.iter().enumerate().all(|(i, f)| f.index == i));

        assert!(ds.remove(10).is_none());
        assert!(ds.remove(0).is_some());
        assert_eq!(ds.n_frames(), 6);
    }

    #[test]
    fn test_filter_discarded_and_cursor_clamp() {
        let mut ds = dataset(4);
        ds.set_current_frame(3);
        ds.get_mut(2).unwrap().discard = true;
        ds.get_mut(3).unwrap().discard = true;

        assert_eq!(ds.filter_discarded(), 2);
        assert_eq!(ds.n_frames(), 2);
        assert_eq!(ds.current_frame(), 1);
        assert_eq!(ds.current().and_then(|f| f.get(0, 0)), Some(1.0));
    }

    #[test]
    fn test_pixel_size_shared() {
        let mut ds = dataset(2);
        ds.set_pixel_size(100.0);
        ds.push(Frame::zeros(1, 1));
        assert!(ds.iter().all(|f| f.pixel_size == 100.0));
    }

    #[test]
    fn test_from_directory_sorted() {
        let dir = std::env::temp_dir().join(format!("scnodes-ds-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, v) in [("b.tif", 2.0), ("a.tif", 1.0)] {
            image_io::save_tiff_counts(&dir.join(name), 1, 1, &[v]).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "skip").unwrap();

        let ds = Dataset::from_path(&dir, 80.0).unwrap();
        assert_eq!(ds.n_frames(), 2);
        assert_eq!(ds.get(0).and_then(|f| f.get(0, 0)), None); // not loaded yet
        ds.get(0).unwrap().load().unwrap();
        assert_eq!(ds.get(0).and_then(|f| f.get(0, 0)), Some(1.0));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_multi_page_tiff_expands_to_frames() {
        let dir = std::env::temp_dir().join(format!("scnodes-ds-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let planes: Vec<Vec<f32>> = (0..3).map(|k| vec![k as f32 / 2.0; 16]).collect();
        let refs: Vec<&[f32]> = planes.iter().map(Vec::as_slice).collect();
        image_io::save_tiff_stack_gray16(&dir.join("a_stack.tif"), 4, 4, &refs).unwrap();
        image_io::save_tiff_counts(&dir.join("b_single.tif"), 4, 4, &[7.0; 16]).unwrap();

        let ds = Dataset::from_path(&dir.join("a_stack.tif"), 100.0).unwrap();
        assert_eq!(ds.n_frames(), 3);
        assert_eq!(ds.get(2).unwrap().page(), 2);
        assert_eq!(ds.get(1).unwrap().get(0, 0), None);
        assert_eq!(ds.get(1).unwrap().pixels().unwrap()[0], 32768.0);

        let all = Dataset::from_path(&dir, 100.0).unwrap();
        assert_eq!(all.n_frames(), 4);
        assert!(all.iter().enumerate().all(|(i, f)| f.index == i));
        assert_eq!(all.get(3).unwrap().pixels().unwrap()[0], 7.0);
        let _ = std::fs::remove_dir_all(dir);
    }
}
