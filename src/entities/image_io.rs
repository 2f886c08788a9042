//! Raster file I/O on top of the `image` and `tiff` crates.
//!
//! Microscopy frames are kept as single-channel `f32` with raw detector
//! counts, so 8/16-bit grayscale files are read without normalisation.
//! TIFF files go through the `tiff` decoder directly so that every page of a
//! multi-page stack is reachable; other formats use `image`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result, bail};
use image::{DynamicImage, ImageBuffer, Luma, Rgba};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{TiffEncoder, colortype};

/// Extensions accepted by [`load_grayscale`] and directory scans.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["tif", "tiff", "png", "jpg", "jpeg"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "tif" | "tiff"))
}

fn open_tiff(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Decoder::new(BufReader::new(file)).with_context(|| format!("Failed to read TIFF header of {}", path.display()))
}

/// Number of pages (images) in a file; 1 for non-TIFF formats.
pub fn page_count(path: &Path) -> Result<usize> {
    if !is_tiff(path) {
        return Ok(1);
    }
    let mut decoder = open_tiff(path)?;
    let mut pages = 1;
    while decoder.more_images() {
        decoder
            .next_image()
            .with_context(|| format!("{}: bad directory after page {}", path.display(), pages))?;
        pages += 1;
    }
    Ok(pages)
}

/// Decode the first page of an image file into `(width, height, row-major f32 pixels)`.
pub fn load_grayscale(path: &Path) -> Result<(usize, usize, Vec<f32>)> {
    load_page(path, 0)
}

/// Decode page `page` of an image file. Only TIFF has more than one page.
pub fn load_page(path: &Path, page: usize) -> Result<(usize, usize, Vec<f32>)> {
    if is_tiff(path) {
        return load_tiff_page(path, page);
    }
    if page > 0 {
        bail!("{} has a single page, requested page {}", path.display(), page);
    }
    let img = image::open(path).with_context(|| format!("Failed to decode {}", path.display()))?;
    let (w, h) = (img.width() as usize, img.height() as usize);

    let pixels: Vec<f32> = match img {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => img.to_luma32f().into_raw(),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_) | DynamicImage::ImageLumaA16(_) => {
            img.to_luma16().into_raw().into_iter().map(f32::from).collect()
        }
        other => other.to_luma8().into_raw().into_iter().map(f32::from).collect(),
    };

    if pixels.len() != w * h {
        bail!("{}: decoded {} pixels for {}x{}", path.display(), pixels.len(), w, h);
    }
    Ok((w, h, pixels))
}

fn load_tiff_page(path: &Path, page: usize) -> Result<(usize, usize, Vec<f32>)> {
    let mut decoder = open_tiff(path)?;
    for n in 0..page {
        if !decoder.more_images() {
            bail!("{} has {} page(s), requested page {}", path.display(), n + 1, page);
        }
        decoder
            .next_image()
            .with_context(|| format!("{}: bad directory for page {}", path.display(), n + 1))?;
    }
    let (w, h) = decoder.dimensions().with_context(|| format!("{}: missing dimensions", path.display()))?;
    let (w, h) = (w as usize, h as usize);
    let samples = match decoder
        .read_image()
        .with_context(|| format!("Failed to decode page {} of {}", page, path.display()))?
    {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect::<Vec<f32>>(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => bail!("{}: unsupported TIFF sample format", path.display()),
    };

    let n = w * h;
    if n == 0 || samples.len() % n != 0 {
        bail!("{}: decoded {} samples for {}x{}", path.display(), samples.len(), w, h);
    }
    // Multi-channel pages are averaged to one channel.
    let channels = samples.len() / n;
    let pixels = if channels == 1 {
        samples
    } else {
        samples
            .chunks_exact(channels)
            .map(|c| c.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok((w, h, pixels))
}

/// Write 8-bit RGBA pixels (row-major, 4 bytes per pixel) as PNG.
pub fn save_png_rgba8(path: &Path, width: usize, height: usize, rgba: Vec<u8>) -> Result<()> {
    let buf: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_raw(width as u32, height as u32, rgba)
        .with_context(|| format!("RGBA buffer does not match {}x{}", width, height))?;
    buf.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {}x{} PNG {}", width, height, path.display());
    Ok(())
}

/// Write planes as one multi-page 16-bit grayscale TIFF, one page per plane.
///
/// Values are expected in `[0, 1]` and clamped before quantisation.
pub fn save_tiff_stack_gray16(path: &Path, width: usize, height: usize, planes: &[&[f32]]) -> Result<()> {
    if planes.is_empty() {
        bail!("No planes to write to {}", path.display());
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    for (n, plane) in planes.iter().enumerate() {
        if plane.len() != width * height {
            bail!("Plane {} has {} values, expected {}x{}", n, plane.len(), width, height);
        }
        let raw: Vec<u16> = plane
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16)
            .collect();
        encoder
            .write_image::<colortype::Gray16>(width as u32, height as u32, &raw)
            .with_context(|| format!("Failed to write page {} of {}", n, path.display()))?;
    }
    log::info!("Wrote {} page(s) {}x{} TIFF {}", planes.len(), width, height, path.display());
    Ok(())
}

/// Write raw detector counts as 16-bit grayscale TIFF, clamped to the u16 range.
pub fn save_tiff_counts(path: &Path, width: usize, height: usize, counts: &[f32]) -> Result<()> {
    let raw: Vec<u16> = counts
        .iter()
        .map(|v| v.clamp(0.0, u16::MAX as f32).round() as u16)
        .collect();
    let buf: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(width as u32, height as u32, raw)
        .with_context(|| format!("Frame does not match {}x{}", width, height))?;
    buf.save_with_format(path, image::ImageFormat::Tiff)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray16_roundtrip_keeps_counts() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("scnodes-io-{}.tif", uuid::Uuid::new_v4()));
        let counts = vec![0.0, 100.0, 4000.0, 65535.0];
        save_tiff_counts(&path, 2, 2, &counts).unwrap();

        let (w, h, px) = load_grayscale(&path).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(px, counts);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_multi_page_tiff_pages() {
        let path = std::env::temp_dir().join(format!("scnodes-pages-{}.tif", uuid::Uuid::new_v4()));
        let planes: Vec<Vec<f32>> = (0..3).map(|k| vec![k as f32 * 0.5; 16]).collect();
        let refs: Vec<&[f32]> = planes.iter().map(Vec::as_slice).collect();
        save_tiff_stack_gray16(&path, 4, 4, &refs).unwrap();

        assert_eq!(page_count(&path).unwrap(), 3);
        let (w, h, last) = load_page(&path, 2).unwrap();
        assert_eq!((w, h), (4, 4));
        assert!(last.iter().all(|v| *v == 65535.0));
        assert!(load_page(&path, 1).unwrap().2.iter().all(|v| *v == 32768.0));
        assert!(load_grayscale(&path).unwrap().2.iter().all(|v| *v == 0.0));
        assert!(load_page(&path, 3).is_err());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("a/b/stack_001.TIF")));
        assert!(is_supported(Path::new("x.png")));
        assert!(!is_supported(Path::new("x.mrc")));
    }
}
