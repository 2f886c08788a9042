//! Tiled export of the correlation scene.
//!
//! The output raster can be far larger than one framebuffer. A world
//! rectangle is split into `T x T` pixel tiles; each tile gets its own
//! camera (centred on the tile, zoom `1 / pixel_size`, no rotation) that
//! selects the layers reaching into it. The tile is rendered on its own,
//! then the valid part is copied into the output.
//!
//! ```text
//! tiles_h = ceil(region_w / (T * ps))
//! tiles_v = ceil(region_h / (T * ps))
//! ```
//!
//! Output pixel `(X, Y)` is always sampled at
//! `(min.x + (X + 0.5) * ps, max.y - (Y + 0.5) * ps)`, whichever tile draws it,
//! so any tiling gives the same raster.
//!
//! Alpha of the RGBA output is the occupancy mask. A channel stack renders
//! every layer alone with a grayscale LUT into its own `f32` plane and is
//! written as one multi-page TIFF.

use std::path::Path;

use anyhow::{Result, bail};
use glam::DVec2;

use super::renderer::{Framebuffer, PixelGrid, RenderLayer, bounds_overlap, render_grid, view_bounds};
use crate::entities::camera::Camera;
use crate::entities::image_io;

/// Axis-aligned world rectangle (Y up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldRect {
    pub min: DVec2,
    pub max: DVec2,
}

impl WorldRect {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    /// Bounds of all visible layers.
    pub fn of_layers(layers: &[RenderLayer]) -> Option<Self> {
        layers
            .iter()
            .filter(|l| l.is_visible())
            .map(|l| l.bounds())
            .reduce(|(lo_a, hi_a), (lo_b, hi_b)| (lo_a.min(lo_b), hi_a.max(hi_b)))
            .map(|(lo, hi)| Self::new(lo, hi))
    }

    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }
}

/// Tiling of a world rectangle at a given output pixel size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    pub rect: WorldRect,
    pub pixel_size: f64,
    pub tile_size: usize,
    pub tiles_h: usize,
    pub tiles_v: usize,
    /// Output raster size in pixels.
    pub width: usize,
    pub height: usize,
}

impl TileGrid {
    pub fn new(rect: WorldRect, pixel_size: f64, tile_size: usize) -> Result<Self> {
        if !(pixel_size > 0.0) || tile_size == 0 {
            bail!("Invalid export settings: pixel size {}, tile size {}", pixel_size, tile_size);
        }
        let size = rect.size();
        let tile_world = tile_size as f64 * pixel_size;
        let tiles_h = (size.x / tile_world).ceil().max(1.0) as usize;
        let tiles_v = (size.y / tile_world).ceil().max(1.0) as usize;
        let width = (size.x / pixel_size).ceil().max(1.0) as usize;
        let height = (size.y / pixel_size).ceil().max(1.0) as usize;
        Ok(Self { rect, pixel_size, tile_size, tiles_h, tiles_v, width, height })
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_h * self.tiles_v
    }

    /// Tile `(i, j)`: column `i`, row `j` counted from the top.
    pub fn tiles(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.tiles_v).flat_map(move |j| (0..self.tiles_h).map(move |i| (i, j)))
    }

    /// Lattice of output pixels over the whole raster.
    pub fn pixel_grid(&self) -> PixelGrid {
        PixelGrid::new(DVec2::new(self.rect.min.x, self.rect.max.y), self.pixel_size)
    }

    /// Camera looking at the centre of tile `(i, j)` with one output pixel per `pixel_size`.
    pub fn tile_camera(&self, i: usize, j: usize) -> Camera {
        let t = self.tile_size as f64;
        let half = t * 0.5 * self.pixel_size;
        let center = DVec2::new(
            self.rect.min.x + i as f64 * t * self.pixel_size + half,
            self.rect.max.y - j as f64 * t * self.pixel_size - half,
        );
        let mut camera = Camera::new(t, t);
        camera.zoom = 1.0 / self.pixel_size;
        camera.look_at(center);
        camera
    }

    /// Output pixel origin and valid size of tile `(i, j)`, clamped at the raster edge.
    pub fn tile_region(&self, i: usize, j: usize) -> (usize, usize, usize, usize) {
        let x0 = i * self.tile_size;
        let y0 = j * self.tile_size;
        let w = self.tile_size.min(self.width.saturating_sub(x0));
        let h = self.tile_size.min(self.height.saturating_sub(y0));
        (x0, y0, w, h)
    }
}

/// RGBA float raster; alpha is 1 where any layer drew.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRaster {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<f32>,
}

impl ExportRaster {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, rgba: vec![0.0; width * height * 4] }
    }

    pub fn pixel(&self, x: usize, y: usize) -> [f32; 4] {
        let i = (y * self.width + x) * 4;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }

    fn blit(&mut self, fb: &Framebuffer, x0: usize, y0: usize, w: usize, h: usize) {
        for y in 0..h {
            let (rgb, occ) = fb.row(y);
            let dst_row = ((y0 + y) * self.width + x0) * 4;
            for x in 0..w {
                let d = dst_row + x * 4;
                self.rgba[d..d + 3].copy_from_slice(&rgb[x * 3..x * 3 + 3]);
                self.rgba[d + 3] = if occ[x] { 1.0 } else { 0.0 };
            }
        }
    }

    pub fn to_rgba8(&self) -> Vec<u8> {
        self.rgba
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        image_io::save_png_rgba8(path, self.width, self.height, self.to_rgba8())
    }
}

/// Render `layers` over `grid`.
pub fn render_tiled(layers: &[RenderLayer], grid: &TileGrid) -> ExportRaster {
    render_tiled_with(layers, grid, |_| {}, || false).unwrap_or_else(|| ExportRaster::new(grid.width, grid.height))
}

/// Render with per-tile progress in `[0, 1]`; `None` if `cancelled` returns true between tiles.
pub fn render_tiled_with(
    layers: &[RenderLayer],
    grid: &TileGrid,
    progress: impl Fn(f64),
    cancelled: impl Fn() -> bool,
) -> Option<ExportRaster> {
    let mut out = ExportRaster::new(grid.width, grid.height);
    let mut fb = Framebuffer::new(grid.tile_size, grid.tile_size);
    let lattice = grid.pixel_grid();
    let total = grid.tile_count() as f64;
    log::debug!(
        "Tiled export: {}x{} px in {}x{} tiles of {}",
        grid.width,
        grid.height,
        grid.tiles_h,
        grid.tiles_v,
        grid.tile_size
    );

    for (n, (i, j)) in grid.tiles().enumerate() {
        if cancelled() {
            log::info!("Tiled export cancelled after {} tile(s)", n);
            return None;
        }
        let (x0, y0, w, h) = grid.tile_region(i, j);
        if w == 0 || h == 0 {
            continue;
        }
        let (lo, hi) = view_bounds(&grid.tile_camera(i, j));
        let slack = DVec2::splat(grid.pixel_size);
        let window = (lo - slack, hi + slack);
        let reaching: Vec<RenderLayer> = layers.iter().filter(|l| bounds_overlap(l.bounds(), window)).copied().collect();
        render_grid(&lattice.with_offset(x0, y0), &reaching, &mut fb);
        out.blit(&fb, x0, y0, w, h);
        progress((n + 1) as f64 / total);
    }
    Some(out)
}

/// One grayscale plane per layer.
#[derive(Debug, Clone, PartialEq)]
pub struct StackExport {
    pub width: usize,
    pub height: usize,
    /// `(layer title, plane in [0, 1])`.
    pub planes: Vec<(String, Vec<f32>)>,
}

impl StackExport {
    /// Write all planes as pages of one 16-bit TIFF, in layer order.
    pub fn save_tiff(&self, path: &Path) -> Result<()> {
        let planes: Vec<&[f32]> = self.planes.iter().map(|(_, p)| p.as_slice()).collect();
        image_io::save_tiff_stack_gray16(path, self.width, self.height, &planes)
    }
}

/// Render every visible layer alone with a grayscale LUT.
pub fn render_stack(layers: &[RenderLayer], grid: &TileGrid) -> StackExport {
    let planes = layers
        .iter()
        .filter(|l| l.is_visible())
        .map(|l| {
            let raster = render_tiled(&[l.grayscale()], grid);
            let plane = raster.rgba.chunks_exact(4).map(|px| px[0]).collect();
            (l.title().to_string(), plane)
        })
        .collect();
    StackExport { width: grid.width, height: grid.height, planes }
}
