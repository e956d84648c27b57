use firesight_common::grid::ActivityGrid;

/// Hue, saturation and lightness with an alpha channel. Hue is in degrees,
/// the rest in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsla {
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
    pub alpha: f64,
}

impl Hsla {
    /// Color of a cell with intensity `v`: blue (240°) when idle sweeping to
    /// red (0°) when busy, never fully transparent nor fully opaque.
    pub fn for_intensity(v: f64) -> Self {
        let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        Self {
            hue: (1.0 - v) * 240.0,
            saturation: 1.0,
            lightness: 0.5,
            alpha: 0.3 + v * 0.5,
        }
    }

    /// Straight (non-premultiplied) RGBA, each channel in 0..=1.
    pub fn to_rgba(self) -> [f64; 4] {
        let c = (1.0 - (2.0 * self.lightness - 1.0).abs()) * self.saturation;
        let h = self.hue.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = self.lightness - c / 2.0;
        [r + m, g + m, b + m, self.alpha]
    }
}

/// A 2-D drawing surface.
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Reset every pixel to fully transparent.
    fn clear(&mut self);
    /// Composite `color` over the rectangle. Coordinates are in pixels and
    /// may be fractional; the part outside the canvas is ignored.
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Hsla);
}

/// Paint `grid` over the whole canvas.
///
/// The canvas is always cleared first. Cells are `width/cols` by
/// `height/rows` pixels and each is drawn one pixel larger in both
/// directions so fractional cell edges leave no seams. An empty grid leaves
/// the canvas blank.
pub fn render(grid: &ActivityGrid, canvas: &mut impl Canvas) {
    canvas.clear();
    if grid.is_empty() {
        return;
    }

    let cell_w = f64::from(canvas.width()) / grid.cols() as f64;
    let cell_h = f64::from(canvas.height()) / grid.rows() as f64;
    for (i, j, v) in grid.cells() {
        canvas.fill_rect(
            j as f64 * cell_w,
            i as f64 * cell_h,
            cell_w + 1.0,
            cell_h + 1.0,
            Hsla::for_intensity(v),
        );
    }
}
