//! RGB raster with the few primitives the figures need: rectangles, lines,
//! and even-odd polygon fill.

use std::fs;
use std::path::Path;

use geo::{Coord, MultiPolygon, Rect};
use image::{Rgb, RgbImage};

use crate::colormap::Color;
use crate::error::{RenderError, Result};

pub const WHITE: Color = [255, 255, 255];
pub const BLACK: Color = [0, 0, 0];
/// Matplotlib `edgecolor='0.8'`.
pub const LIGHT_GREY: Color = [204, 204, 204];

pub struct Canvas {
    img: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        Self { img: RgbImage::from_pixel(width, height, Rgb(background)) }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.img
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.img.get_pixel(x, y).0
    }

    /// Set a pixel; coordinates outside the canvas are ignored.
    #[inline]
    pub fn put(&mut self, x: i64, y: i64, c: Color) {
        if x >= 0 && y >= 0 && (x as u32) < self.img.width() && (y as u32) < self.img.height() {
            self.img.put_pixel(x as u32, y as u32, Rgb(c));
        }
    }

    /// Fill the pixel rectangle `[x0, x1) × [y0, y1)`, clipped.
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, c: Color) {
        let (w, h) = (self.img.width() as i64, self.img.height() as i64);
        for y in y0.max(0)..y1.min(h) {
            for x in x0.max(0)..x1.min(w) {
                self.img.put_pixel(x as u32, y as u32, Rgb(c));
            }
        }
    }

    pub fn stroke_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, c: Color) {
        let (x0f, y0f, x1f, y1f) = (x0 as f64, y0 as f64, (x1 - 1) as f64, (y1 - 1) as f64);
        self.line((x0f, y0f), (x1f, y0f), c);
        self.line((x1f, y0f), (x1f, y1f), c);
        self.line((x1f, y1f), (x0f, y1f), c);
        self.line((x0f, y1f), (x0f, y0f), c);
    }

    /// One-pixel line between two points in pixel space.
    pub fn line(&mut self, a: (f64, f64), b: (f64, f64), c: Color) {
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0);
        if !steps.is_finite() {
            return;
        }
        let n = steps as i64;
        for i in 0..=n {
            let t = i as f64 / steps;
            self.put((a.0 + dx * t).round() as i64, (a.1 + dy * t).round() as i64, c);
        }
    }

    /// Fill the union of `rings` under the even-odd rule.
    ///
    /// Scanline fill sampled at pixel centres: for each row, edge crossings
    /// at `y + 0.5` are sorted and spans between successive pairs are painted.
    /// Holes come out naturally from the parity.
    pub fn fill_rings(&mut self, rings: &[Vec<(f64, f64)>], c: Color) {
        let (ymin, ymax) = rings
            .iter()
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.1), hi.max(p.1)));
        if !(ymin.is_finite() && ymax.is_finite()) {
            return;
        }

        let h = self.img.height() as i64;
        let row0 = (ymin - 0.5).ceil().max(0.0) as i64;
        let row1 = ((ymax - 0.5).floor() as i64).min(h - 1);
        let mut xs: Vec<f64> = Vec::new();

        for row in row0..=row1 {
            let sy = row as f64 + 0.5;
            xs.clear();
            for ring in rings {
                for edge in ring.windows(2) {
                    let ((x0, y0), (x1, y1)) = (edge[0], edge[1]);
                    if (y0 <= sy && sy < y1) || (y1 <= sy && sy < y0) {
                        xs.push(x0 + (sy - y0) / (y1 - y0) * (x1 - x0));
                    }
                }
            }
            xs.sort_by(f64::total_cmp);
            for pair in xs.chunks_exact(2) {
                let x_start = (pair[0] - 0.5).ceil() as i64;
                let x_end = (pair[1] - 0.5).floor() as i64;
                self.fill_rect(x_start, row, x_end + 1, row + 1, c);
            }
        }
    }

    pub fn stroke_rings(&mut self, rings: &[Vec<(f64, f64)>], c: Color) {
        for ring in rings {
            for edge in ring.windows(2) {
                self.line(edge[0], edge[1], c);
            }
        }
    }

    /// Write as PNG, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RenderError::Io { path: parent.to_path_buf(), source })?;
        }
        self.img
            .save(path)
            .map_err(|source| RenderError::Image { path: path.to_path_buf(), source })
    }
}

// ── World → pixel ─────────────────────────────────────────────────────────────

/// Uniform-scale mapping from projected metres into a pixel box, y flipped so
/// north is up. The world extent is centred in the box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapTransform {
    scale: f64,
    world_min: Coord<f64>,
    /// Pixel position of `world_min` (bottom-left of the extent).
    origin: (f64, f64),
}

impl MapTransform {
    /// Fit `world` into the pixel box at `(x, y)` of size `w × h`.
    /// `None` for a zero-area box.
    pub fn fit(world: Rect<f64>, x: f64, y: f64, w: f64, h: f64) -> Option<Self> {
        if !(w > 0.0 && h > 0.0) {
            return None;
        }
        let (ww, wh) = (world.width(), world.height());
        let scale = match (ww > 0.0, wh > 0.0) {
            (true, true) => (w / ww).min(h / wh),
            (true, false) => w / ww,
            (false, true) => h / wh,
            (false, false) => 1.0,
        };
        let pad_x = (w - ww * scale) / 2.0;
        let pad_y = (h - wh * scale) / 2.0;
        Some(Self { scale, world_min: world.min(), origin: (x + pad_x, y + h - pad_y) })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn to_px(&self, c: Coord<f64>) -> (f64, f64) {
        (
            self.origin.0 + (c.x - self.world_min.x) * self.scale,
            self.origin.1 - (c.y - self.world_min.y) * self.scale,
        )
    }

    /// Every ring (exteriors and holes) of a MultiPolygon in pixel space.
    pub fn rings(&self, mp: &MultiPolygon<f64>) -> Vec<Vec<(f64, f64)>> {
        mp.iter()
            .flat_map(|poly| std::iter::once(poly.exterior()).chain(poly.interiors()))
            .map(|ring| ring.coords().map(|&c| self.to_px(c)).collect())
            .collect()
    }

    pub fn rect_ring(&self, r: &Rect<f64>) -> Vec<(f64, f64)> {
        let (lo, hi) = (r.min(), r.max());
        [(lo.x, lo.y), (hi.x, lo.y), (hi.x, hi.y), (lo.x, hi.y), (lo.x, lo.y)]
            .into_iter()
            .map(|(x, y)| self.to_px(Coord { x, y }))
            .collect()
    }
}
