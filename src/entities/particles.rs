//! Localised particles and super-resolution reconstruction.
//!
//! Coordinates follow the ThunderSTORM convention: nm, origin at the
//! top-left of the source frame, +Y down. CSV columns:
//!
//! ```text
//! "id","frame","x [nm]","y [nm]","sigma [nm]","intensity [counts]","bkgstd [counts]"
//! ```

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use super::frame::Frame;

/// Splats are truncated at this many sigmas.
const SPLAT_CUTOFF_SIGMAS: f64 = 3.0;

pub const CSV_COLUMNS: [&str; 7] = [
    "id",
    "frame",
    "x [nm]",
    "y [nm]",
    "sigma [nm]",
    "intensity [counts]",
    "bkgstd [counts]",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub frame: usize,
    pub x: f64,
    pub y: f64,
    pub sigma: f64,
    pub intensity: f64,
    pub bkgstd: f64,
}

impl Particle {
    /// Sigma used for rendering; never narrower than half an output pixel.
    #[inline]
    pub fn effective_sigma(&self, pixel_size: f64) -> f64 {
        self.sigma.max(pixel_size * 0.5)
    }

    /// Gaussian contribution at offset `(dx, dy)` nm over a pixel of `area` nm².
    ///
    /// `None` beyond the splat cutoff.
    #[inline]
    pub fn kernel(&self, dx: f64, dy: f64, sigma: f64, area: f64) -> Option<f64> {
        let d2 = dx * dx + dy * dy;
        let reach = SPLAT_CUTOFF_SIGMAS * sigma;
        if d2 > reach * reach {
            return None;
        }
        let two_s2 = 2.0 * sigma * sigma;
        Some(self.intensity * area / (std::f64::consts::PI * two_s2) * (-d2 / two_s2).exp())
    }

    /// Gaussian density in counts per nm² at offset `(dx, dy)` nm.
    #[inline]
    pub fn density(&self, dx: f64, dy: f64, sigma: f64) -> Option<f64> {
        self.kernel(dx, dy, sigma, 1.0)
    }

    /// Radius beyond which [`Particle::kernel`] is zero.
    pub fn reach(&self, pixel_size: f64) -> f64 {
        SPLAT_CUTOFF_SIGMAS * self.effective_sigma(pixel_size)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleSet {
    pub particles: Vec<Particle>,
}

impl ParticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn push(&mut self, p: Particle) {
        self.particles.push(p);
    }

    pub fn extend(&mut self, other: ParticleSet) {
        self.particles.extend(other.particles);
    }

    /// Particles from a frame's detected maxima.
    ///
    /// Maxima are pixel indices; the particle sits at the pixel centre.
    pub fn from_frame(frame: &Frame, sigma_nm: f64) -> Self {
        let ps = frame.pixel_size;
        let bkgstd = frame.stats().map(|s| s.std).unwrap_or(0.0);
        let particles = frame
            .maxima
            .iter()
            .map(|m| Particle {
                frame: frame.index,
                x: (m[0] + 0.5) * ps,
                y: (m[1] + 0.5) * ps,
                sigma: sigma_nm,
                intensity: frame.get(m[0] as usize, m[1] as usize).unwrap_or(0.0) as f64,
                bkgstd,
            })
            .collect();
        Self { particles }
    }

    /// `(min, max)` of particle positions in nm.
    pub fn bounds(&self) -> Option<([f64; 2], [f64; 2])> {
        let first = self.particles.first()?;
        let init = ([first.x, first.y], [first.x, first.y]);
        Some(self.particles.iter().fold(init, |(lo, hi), p| {
            ([lo[0].min(p.x), lo[1].min(p.y)], [hi[0].max(p.x), hi[1].max(p.y)])
        }))
    }

    /// Render normalised Gaussian splats into a `width x height` image.
    ///
    /// Pixel `(i, j)` covers `origin + [i, i+1) * pixel_size` (image
    /// coordinates, +Y down); each particle integrates to its intensity.
    pub fn render(&self, origin: [f64; 2], width: usize, height: usize, pixel_size: f64) -> Vec<f32> {
        let mut out = vec![0.0f32; width * height];
        let area = pixel_size * pixel_size;
        let span = |c: f64, o: f64, reach: f64, n: usize| {
            let lo = ((c - reach - o) / pixel_size).floor().max(0.0) as usize;
            let hi = (((c + reach - o) / pixel_size).ceil().max(0.0) as usize).min(n);
            lo..hi
        };
        for p in &self.particles {
            let sigma = p.effective_sigma(pixel_size);
            let reach = SPLAT_CUTOFF_SIGMAS * sigma;
            for j in span(p.y, origin[1], reach, height) {
                let cy = origin[1] + (j as f64 + 0.5) * pixel_size;
                for i in span(p.x, origin[0], reach, width) {
                    let cx = origin[0] + (i as f64 + 0.5) * pixel_size;
                    if let Some(v) = p.kernel(cx - p.x, cy - p.y, sigma, area) {
                        out[j * width + i] += v as f32;
                    }
                }
            }
        }
        out
    }

    pub fn write_csv(&self, mut w: impl Write) -> Result<()> {
        let header: Vec<String> = CSV_COLUMNS.iter().map(|c| format!("\"{}\"", c)).collect();
        writeln!(w, "{}", header.join(","))?;
        for (i, p) in self.particles.iter().enumerate() {
            // ThunderSTORM ids and frames are 1-based.
            writeln!(
                w,
                "{},{},{},{},{},{},{}",
                i + 1,
                p.frame + 1,
                p.x,
                p.y,
                p.sigma,
                p.intensity,
                p.bkgstd
            )?;
        }
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_csv(std::io::BufWriter::new(file))?;
        log::info!("Wrote {} particles to {}", self.len(), path.display());
        Ok(())
    }

    /// Parse ThunderSTORM-style CSV. Only `x [nm]` and `y [nm]` are required.
    pub fn read_csv(reader: impl BufRead) -> Result<Self> {
        let mut lines = reader.lines();
        let header = lines.next().ok_or_else(|| anyhow!("Empty particle CSV"))??;
        let columns: Vec<String> = header
            .split(',')
            .map(|c| c.trim().trim_matches('"').to_string())
            .collect();
        let col = |name: &str| columns.iter().position(|c| c == name);

        let (Some(cx), Some(cy)) = (col("x [nm]"), col("y [nm]")) else {
            bail!("Particle CSV needs 'x [nm]' and 'y [nm]' columns, found {:?}", columns);
        };
        let c_frame = col("frame");
        let c_sigma = col("sigma [nm]");
        let c_int = col("intensity [counts]");
        let c_bkg = col("bkgstd [counts]");

        let mut set = ParticleSet::new();
        for (n, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let num = |c: usize| -> Result<f64> {
                let raw = fields
                    .get(c)
                    .ok_or_else(|| anyhow!("Line {}: missing column {}", n + 2, columns[c]))?;
                raw.parse::<f64>()
                    .with_context(|| format!("Line {}: bad number '{}' in {}", n + 2, raw, columns[c]))
            };
            let opt = |c: Option<usize>| -> Result<f64> { c.map(&num).transpose().map(|v| v.unwrap_or(0.0)) };

            set.push(Particle {
                frame: (opt(c_frame)? as usize).saturating_sub(1),
                x: num(cx)?,
                y: num(cy)?,
                sigma: opt(c_sigma)?,
                intensity: opt(c_int)?,
                bkgstd: opt(c_bkg)?,
            });
        }
        Ok(set)
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let set = Self::read_csv(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        log::info!("Loaded {} particles from {}", set.len(), path.display());
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(x: f64, y: f64) -> Particle {
        Particle { frame: 0, x, y, sigma: 20.0, intensity: 1000.0, bkgstd: 1.0 }
    }

    #[test]
    fn test_csv_roundtrip_with_quoted_header() {
        let mut set = ParticleSet::new();
        set.push(particle(10.5, 20.25));
        set.push(Particle { frame: 3, ..particle(-1.0, 7.0) });

        let mut buf = Vec::new();
        set.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("\"id\",\"frame\",\"x [nm]\""));

        let back = ParticleSet::read_csv(std::io::Cursor::new(buf)).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_csv_minimal_columns() {
        let csv = "x [nm],y [nm]\n1.5,2.5\n\n3,4\n";
        let set = ParticleSet::read_csv(std::io::Cursor::new(csv)).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.particles[1].x, 3.0);
        assert_eq!(set.particles[1].frame, 0);

        let err = ParticleSet::read_csv(std::io::Cursor::new("a,b\n1,2\n")).unwrap_err();
        assert!(err.to_string().contains("x [nm]"));
        assert!(ParticleSet::read_csv(std::io::Cursor::new("x [nm],y [nm]\n1,zz\n")).is_err());
    }

    #[test]
    fn test_from_frame_uses_pixel_centres() {
        let mut frame = Frame::from_pixels(4, 4, (0..16).map(|v| v as f32).collect()).unwrap();
        frame.pixel_size = 100.0;
        frame.index = 2;
        frame.maxima = vec![[1.0, 2.0]];
        let set = ParticleSet::from_frame(&frame, 15.0);
        let p = set.particles[0];
        assert_eq!((p.x, p.y), (150.0, 250.0));
        assert_eq!(p.intensity, 9.0);
        assert_eq!(p.frame, 2);
    }

    #[test]
    fn test_render_conserves_intensity() {
        let mut set = ParticleSet::new();
        set.push(particle(500.0, 500.0));
        let img = set.render([0.0, 0.0], 100, 100, 10.0);
        let total: f32 = img.iter().sum();
        // 3-sigma truncation loses ~1.1% of a 2D Gaussian.
        assert!((total - 1000.0).abs() < 15.0, "total {}", total);
        // Peak lands on the pixels around (50, 50).
        let max_idx = img
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!([49 * 100 + 49, 49 * 100 + 50, 50 * 100 + 49, 50 * 100 + 50].contains(&max_idx));
    }
}
