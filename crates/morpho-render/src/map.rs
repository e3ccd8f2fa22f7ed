//! Thematic parcel maps: cluster categories, continuous choropleths and the
//! fishnet density heatmap.

use geo::Rect;
use morpho_core::density::Fishnet;
use morpho_core::{ParcelMetrics, ParcelSet};

use crate::canvas::{Canvas, MapTransform, BLACK, LIGHT_GREY, WHITE};
use crate::colormap::{blend, categorical, normalize, Color};
use crate::error::{RenderError, Result};
use crate::RenderConfig;

/// Grey used for parcel outlines under the density grid.
const OUTLINE_GREY: Color = [128, 128, 128];

/// Width reserved right of the map for the legend or colour bar.
const LEGEND_W: u32 = 90;
const SWATCH: i64 = 24;
const BAR_W: i64 = 24;
const BAR_TICKS: usize = 5;

/// Canvas plus transform for a map of `extent`, leaving the legend strip free.
fn map_frame(extent: Rect<f64>, cfg: &RenderConfig) -> Result<(Canvas, MapTransform)> {
    let canvas = Canvas::new(cfg.width, cfg.height, WHITE);
    let m = cfg.margin as f64;
    let w = cfg.width as f64 - 2.0 * m - LEGEND_W as f64;
    let h = cfg.height as f64 - 2.0 * m;
    let t = MapTransform::fit(extent, m, m, w, h).ok_or(RenderError::Empty("canvas smaller than margins"))?;
    Ok((canvas, t))
}

fn legend_x(cfg: &RenderConfig) -> i64 {
    (cfg.width - cfg.margin - LEGEND_W) as i64 + 20
}

/// Parcels coloured by cluster label with a swatch legend, one box per label
/// from the top. Unlabelled parcels are drawn in outline only.
pub fn render_cluster_map(set: &ParcelSet, cfg: &RenderConfig) -> Result<Canvas> {
    let extent = set.total_bounds().ok_or(RenderError::Empty("parcel layer has no geometry"))?;
    let (mut canvas, t) = map_frame(extent, cfg)?;

    for parcel in &set.parcels {
        let Some(geom) = &parcel.geometry else { continue };
        let rings = t.rings(geom);
        if let Some(c) = parcel.cluster {
            canvas.fill_rings(&rings, categorical(c));
        }
        if cfg.outlines {
            canvas.stroke_rings(&rings, LIGHT_GREY);
        }
    }

    let x = legend_x(cfg);
    for (i, label) in set.cluster_labels().into_iter().enumerate() {
        let y = cfg.margin as i64 + i as i64 * (SWATCH + 10);
        canvas.fill_rect(x, y, x + SWATCH, y + SWATCH, categorical(label));
        canvas.stroke_rect(x, y, x + SWATCH, y + SWATCH, BLACK);
    }
    Ok(canvas)
}

/// Continuous value range for a choropleth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRange {
    /// Min and max of the mapped values.
    Data,
    Fixed { vmin: f64, vmax: f64 },
}

/// Choropleth of one metric with a vertical colour bar (high at the top).
pub fn render_value_map(
    set: &ParcelSet,
    value: fn(&ParcelMetrics) -> f64,
    cmap: fn(f64) -> Color,
    range: ValueRange,
    cfg: &RenderConfig,
) -> Result<Canvas> {
    let extent = set.total_bounds().ok_or(RenderError::Empty("parcel layer has no geometry"))?;
    let (mut canvas, t) = map_frame(extent, cfg)?;

    let (vmin, vmax) = match range {
        ValueRange::Fixed { vmin, vmax } => (vmin, vmax),
        ValueRange::Data => set
            .measured()
            .map(|(_, m)| value(m))
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v))),
    };

    for parcel in &set.parcels {
        let Some(geom) = &parcel.geometry else { continue };
        let rings = t.rings(geom);
        if let Some(m) = &parcel.metrics {
            canvas.fill_rings(&rings, cmap(normalize(value(m), vmin, vmax)));
        }
        if cfg.outlines {
            canvas.stroke_rings(&rings, LIGHT_GREY);
        }
    }

    draw_colour_bar(&mut canvas, cmap, cfg);
    Ok(canvas)
}

fn draw_colour_bar(canvas: &mut Canvas, cmap: fn(f64) -> Color, cfg: &RenderConfig) {
    let x = legend_x(cfg);
    let top = cfg.margin as i64;
    let bottom = (cfg.height - cfg.margin) as i64;
    let span = (bottom - top - 1).max(1) as f64;
    for y in top..bottom {
        let v = 1.0 - (y - top) as f64 / span;
        canvas.fill_rect(x, y, x + BAR_W, y + 1, cmap(v));
    }
    canvas.stroke_rect(x, top, x + BAR_W, bottom, BLACK);
    for i in 0..BAR_TICKS {
        let y = top as f64 + span * i as f64 / (BAR_TICKS - 1) as f64;
        canvas.line(((x + BAR_W) as f64, y), ((x + BAR_W + 6) as f64, y), BLACK);
    }
}

/// Fishnet heatmap: occupied cells coloured by count (clamped at `vmax`),
/// parcel outlines in grey on top.
pub fn render_density_map(
    grid: &Fishnet,
    set: &ParcelSet,
    vmax: u32,
    cmap: fn(f64) -> Color,
    cfg: &RenderConfig,
) -> Result<Canvas> {
    let extent = grid.extent().ok_or(RenderError::Empty("fishnet has no cells"))?;
    let (mut canvas, t) = map_frame(extent, cfg)?;

    let vmin = grid.occupied().map(|c| c.parcel_count).min().unwrap_or(0) as f64;
    for cell in grid.occupied() {
        let v = normalize(cell.parcel_count as f64, vmin, vmax as f64);
        canvas.fill_rings(&[t.rect_ring(&cell.rect)], cmap(v));
    }

    let outline = blend(OUTLINE_GREY, WHITE, 0.7);
    for geom in set.parcels.iter().filter_map(|p| p.geometry.as_ref()) {
        canvas.stroke_rings(&t.rings(geom), outline);
    }

    draw_colour_bar(&mut canvas, cmap, cfg);
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colormap::{reds, viridis_r};
    use geo::{LineString, MultiPolygon, Polygon};
    use morpho_core::density::parcel_density;
    use morpho_core::{Crs, Parcel};

    fn square(x: f64, y: f64, s: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(x, y), (x + s, y), (x + s, y + s), (x, y + s), (x, y)]),
            vec![],
        )])
    }

    fn layer() -> ParcelSet {
        let parcels = (0..4)
            .map(|i| {
                let mut p = Parcel::new(i, square(i as f64 * 100.0, 0.0, 80.0));
                p.cluster = Some(i);
                p.metrics = Some(ParcelMetrics {
                    area_m2: 6400.0,
                    log_area: 6401f64.log10(),
                    perimeter_m: 320.0,
                    perimeter_area_ratio: 0.05,
                    compactness_idx: 0.25 * i as f64,
                    rectangularity_idx: 1.0,
                    orientation_deg: 0.0,
                });
                p
            })
            .collect();
        ParcelSet::new(Crs::Utm { zone: 39, north: true }, parcels)
    }

    fn small() -> RenderConfig {
        RenderConfig { width: 400, height: 200, margin: 10, outlines: false, ..RenderConfig::default() }
    }

    fn count(canvas: &Canvas, c: Color) -> usize {
        canvas.image().pixels().filter(|p| p.0 == c).count()
    }

    #[test]
    fn each_cluster_colour_appears() {
        let canvas = render_cluster_map(&layer(), &small()).unwrap();
        for c in 0..4 {
            assert!(count(&canvas, categorical(c)) > 100, "cluster {c} colour missing");
        }
    }

    #[test]
    fn fixed_range_maps_extremes_to_colormap_ends() {
        let canvas = render_value_map(
            &layer(),
            |m| m.compactness_idx,
            viridis_r,
            ValueRange::Fixed { vmin: 0.0, vmax: 1.0 },
            &small(),
        )
        .unwrap();
        // Parcel 0 has compactness 0 → viridis_r(0) (yellow).
        assert!(count(&canvas, viridis_r(0.0)) > 100);
        assert!(count(&canvas, viridis_r(0.75)) > 100);
    }

    #[test]
    fn empty_layer_is_an_error() {
        let set = ParcelSet::new(Crs::Unknown, vec![]);
        assert!(matches!(render_cluster_map(&set, &small()), Err(RenderError::Empty(_))));
    }

    #[test]
    fn density_map_paints_occupied_cells() {
        let set = layer();
        let grid = parcel_density(&set, 50.0, 0.0).unwrap().unwrap();
        let canvas = render_density_map(&grid, &set, 50, reds, &small()).unwrap();
        let white = count(&canvas, WHITE);
        assert!(white < (400 * 200) as usize);
        assert!(canvas.image().pixels().any(|p| p.0 == reds(0.0)));
    }
}
