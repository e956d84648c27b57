use std::path::Path;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::render::{Canvas, Hsla};

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("failed to create output directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

/// In-memory RGBA raster. Fills are composited source-over, the way a
/// browser canvas draws translucent rectangles.
pub struct RasterCanvas {
    image: RgbaImage,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    pub fn save_png(&self, path: &Path) -> Result<(), RasterError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| RasterError::CreateDir(dir.display().to_string(), e))?;
        }
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    /// Pixel span covered by `[start, start + len)`: pixels whose centers
    /// fall inside it.
    fn span(start: f64, len: f64, limit: u32) -> (u32, u32) {
        let lo = start.round().max(0.0);
        let hi = (start + len).round().min(f64::from(limit));
        if hi <= lo {
            return (0, 0);
        }
        (lo as u32, hi as u32)
    }
}

fn blend(dst: &mut Rgba<u8>, src: [f64; 4]) {
    let sa = src[3];
    let da = f64::from(dst.0[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        dst.0 = [0, 0, 0, 0];
        return;
    }
    for c in 0..3 {
        let dc = f64::from(dst.0[c]) / 255.0;
        let out = (src[c] * sa + dc * da * (1.0 - sa)) / out_a;
        dst.0[c] = (out * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    dst.0[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

impl Canvas for RasterCanvas {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn clear(&mut self) {
        for p in self.image.pixels_mut() {
            p.0 = [0, 0, 0, 0];
        }
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Hsla) {
        let (x0, x1) = Self::span(x, w, self.image.width());
        let (y0, y1) = Self::span(y, h, self.image.height());
        let rgba = color.to_rgba();
        for py in y0..y1 {
            for px in x0..x1 {
                blend(self.image.get_pixel_mut(px, py), rgba);
            }
        }
    }
}
