//! Rose diagrams and the grain-size histogram.

use morpho_core::orientation::RoseHistogram;
use morpho_core::summary::Histogram;

use crate::canvas::{Canvas, BLACK, LIGHT_GREY, WHITE};
use crate::colormap::{blend, categorical, Color};
use crate::error::{RenderError, Result};
use crate::RenderConfig;

const ROSE_RED: Color = [255, 0, 0];
const ROSE_DARKRED: Color = [139, 0, 0];
const ROSE_ALPHA: f64 = 0.7;
/// Arc resolution of rose wedges, in degrees.
const ARC_STEP_DEG: f64 = 1.0;

/// Point at `deg` clockwise from north, `r` pixels from `(cx, cy)`.
#[inline]
fn polar(cx: f64, cy: f64, r: f64, deg: f64) -> (f64, f64) {
    let (s, c) = deg.to_radians().sin_cos();
    (cx + r * s, cy - r * c)
}

fn arc(cx: f64, cy: f64, r: f64, from: f64, to: f64) -> Vec<(f64, f64)> {
    let n = ((to - from) / ARC_STEP_DEG).ceil().max(1.0) as usize;
    (0..=n).map(|i| polar(cx, cy, r, from + (to - from) * i as f64 / n as f64)).collect()
}

/// Draw one rose into the square of radius `radius` around `(cx, cy)`.
///
/// North is up and angles run clockwise, so 0° bars point up (N/S parcels)
/// and 90° bars point right (E/W parcels). Bar length is linear in count,
/// scaled to the fullest bin.
fn draw_rose(canvas: &mut Canvas, cx: f64, cy: f64, radius: f64, rose: &RoseHistogram, fill: Color, edges: bool) {
    // Guides: half and full radius rings, spokes every 45°.
    for frac in [0.5, 1.0] {
        canvas.stroke_rings(&[arc(cx, cy, radius * frac, 0.0, 360.0)], LIGHT_GREY);
    }
    for deg in [0.0, 45.0, 90.0, 135.0] {
        canvas.line(polar(cx, cy, radius, deg), polar(cx, cy, radius, deg + 180.0), LIGHT_GREY);
    }

    let max = rose.max_count();
    if max == 0 {
        return;
    }
    let color = blend(fill, WHITE, ROSE_ALPHA);
    for (i, &count) in rose.counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let r = radius * count as f64 / max as f64;
        let from = rose.bin_start(i);
        let mut ring = vec![(cx, cy)];
        ring.extend(arc(cx, cy, r, from, from + rose.bin_deg));
        ring.push((cx, cy));
        canvas.fill_rings(&[ring.clone()], color);
        if edges {
            canvas.stroke_rings(&[ring], BLACK);
        }
    }
}

/// Overall orientation rose.
pub fn render_rose(rose: &RoseHistogram, cfg: &RenderConfig) -> Result<Canvas> {
    let side = cfg.width.min(cfg.height);
    let radius = side as f64 / 2.0 - cfg.margin as f64;
    if radius <= 0.0 {
        return Err(RenderError::Empty("canvas smaller than margins"));
    }
    let mut canvas = Canvas::new(side, side, WHITE);
    let c = side as f64 / 2.0;
    draw_rose(&mut canvas, c, c, radius, rose, ROSE_RED, false);
    Ok(canvas)
}

/// One rose per cluster in a square grid (2 × 2 for four clusters). Each
/// panel carries a swatch of its cluster colour in the top-left corner.
pub fn render_rose_grid(roses: &[(usize, RoseHistogram)], cfg: &RenderConfig) -> Result<Canvas> {
    if roses.is_empty() {
        return Err(RenderError::Empty("no clusters to draw"));
    }
    let cols = (roses.len() as f64).sqrt().ceil() as u32;
    let rows = (roses.len() as u32).div_ceil(cols);
    let panel = cfg.width.min(cfg.height) / cols.max(rows);
    let radius = panel as f64 / 2.0 - cfg.margin as f64;
    if radius <= 0.0 {
        return Err(RenderError::Empty("canvas smaller than margins"));
    }

    let mut canvas = Canvas::new(panel * cols, panel * rows, WHITE);
    for (i, (cluster, rose)) in roses.iter().enumerate() {
        let (col, row) = (i as u32 % cols, i as u32 / cols);
        let (x0, y0) = ((col * panel) as f64, (row * panel) as f64);
        let c = panel as f64 / 2.0;
        draw_rose(&mut canvas, x0 + c, y0 + c, radius, rose, ROSE_DARKRED, true);

        let (sx, sy) = (x0 as i64 + 8, y0 as i64 + 8);
        canvas.fill_rect(sx, sy, sx + 16, sy + 16, categorical(*cluster));
        canvas.stroke_rect(sx, sy, sx + 16, sy + 16, BLACK);
    }
    Ok(canvas)
}

/// Density histogram of log10(area + 1): filled bars with black edges and
/// plain axes.
pub fn render_histogram(hist: &Histogram, cfg: &RenderConfig) -> Result<Canvas> {
    let m = cfg.margin as f64;
    let (w, h) = (cfg.width as f64 - 2.0 * m, cfg.height as f64 - 2.0 * m);
    if w <= 0.0 || h <= 0.0 || hist.counts.is_empty() {
        return Err(RenderError::Empty("no histogram area"));
    }
    let mut canvas = Canvas::new(cfg.width, cfg.height, WHITE);

    let peak = hist.density.iter().copied().fold(0.0f64, f64::max);
    let bar_w = w / hist.counts.len() as f64;
    let base = m + h;
    for (i, &d) in hist.density.iter().enumerate() {
        if peak <= 0.0 || d <= 0.0 {
            continue;
        }
        let x0 = m + i as f64 * bar_w;
        let top = base - h * d / peak;
        canvas.fill_rect(x0.round() as i64, top.round() as i64, (x0 + bar_w).round() as i64, base as i64, categorical(0));
        canvas.stroke_rect(x0.round() as i64, top.round() as i64, (x0 + bar_w).round() as i64 + 1, base as i64 + 1, BLACK);
    }

    // Axes, with a tick at every whole decade of area.
    canvas.line((m, base), (m + w, base), BLACK);
    canvas.line((m, m), (m, base), BLACK);
    let (lo, hi) = (hist.edges[0], hist.edges[hist.edges.len() - 1]);
    if hi > lo {
        let mut decade = lo.ceil();
        while decade <= hi {
            let x = m + (decade - lo) / (hi - lo) * w;
            canvas.line((x, base), (x, base + 8.0), BLACK);
            decade += 1.0;
        }
    }
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use morpho_core::orientation::rose_histogram;
    use morpho_core::summary::histogram;

    fn cfg() -> RenderConfig {
        RenderConfig { width: 300, height: 300, margin: 20, ..RenderConfig::default() }
    }

    fn has(canvas: &Canvas, c: Color) -> bool {
        canvas.image().pixels().any(|p| p.0 == c)
    }

    #[test]
    fn north_bin_points_up() {
        let rose = rose_histogram([1.0, 2.0, 3.0], 5.0);
        let canvas = render_rose(&rose, &cfg()).unwrap();
        let bar = blend(ROSE_RED, WHITE, ROSE_ALPHA);
        // The 0–5° wedge lies just right of the upward axis, above the centre.
        assert_eq!(canvas.pixel(155, 60), bar);
        assert_ne!(canvas.pixel(155, 240), bar, "nothing below the centre");
    }

    #[test]
    fn east_west_bin_points_right() {
        let rose = rose_histogram([89.0, 90.0], 5.0);
        let canvas = render_rose(&rose, &cfg()).unwrap();
        let bar = blend(ROSE_RED, WHITE, ROSE_ALPHA);
        assert_eq!(canvas.pixel(240, 148), bar);
        assert_ne!(canvas.pixel(150, 60), bar);
    }

    #[test]
    fn empty_rose_still_renders_guides() {
        let rose = rose_histogram(std::iter::empty(), 5.0);
        let canvas = render_rose(&rose, &cfg()).unwrap();
        assert!(has(&canvas, LIGHT_GREY));
    }

    #[test]
    fn grid_has_one_panel_per_cluster() {
        let roses: Vec<(usize, RoseHistogram)> =
            (0..4).map(|c| (c, rose_histogram([c as f64 * 20.0], 5.0))).collect();
        let canvas = render_rose_grid(&roses, &cfg()).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (300, 300));
        for c in 0..4 {
            assert!(has(&canvas, categorical(c)), "swatch for cluster {c}");
        }
        assert!(render_rose_grid(&[], &cfg()).is_err());
    }

    #[test]
    fn histogram_draws_bars() {
        let values: Vec<f64> = (0..200).map(|i| 1.0 + (i % 40) as f64 / 10.0).collect();
        let hist = histogram(&values, 30).unwrap();
        let canvas = render_histogram(&hist, &cfg()).unwrap();
        assert!(has(&canvas, categorical(0)));
    }
}
