//! Fishnet parcel density: a regular grid over the buffered layer extent
//! with the number of parcels touching each cell.
//!
//! # Grid layout
//!
//! ```text
//! rows = ⌈(ymax − ymin + 2b) / s⌉      cols = ⌈(xmax − xmin + 2b) / s⌉
//! X = linspace(xmin − b, xmax + b, cols + 1)
//! Y = linspace(ymin − b, ymax + b, rows + 1)
//! grid_id = col · rows + row
//! ```
//!
//! Edges are spread evenly over the buffered extent, so the actual cell
//! width is at most `s`.

use geo::{BoundingRect, Intersects, MultiPolygon, Rect};
use serde::Serialize;
use tracing::info;

use crate::error::{MorphoError, Result};
use crate::parcel::ParcelSet;

/// Largest grid [`build_fishnet`] will allocate.
pub const MAX_GRID_CELLS: usize = 10_000_000;

/// One fishnet cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub grid_id: usize,
    pub row: usize,
    pub col: usize,
    #[serde(skip)]
    pub rect: Rect<f64>,
    /// Parcels whose outline intersects (or touches) this cell.
    pub parcel_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fishnet {
    pub rows: usize,
    pub cols: usize,
    /// Requested cell size in metres.
    pub cell_size: f64,
    /// Column edges, `cols + 1` values.
    pub xs: Vec<f64>,
    /// Row edges, `rows + 1` values.
    pub ys: Vec<f64>,
    /// Ordered by `grid_id`.
    pub cells: Vec<GridCell>,
}

impl Fishnet {
    pub fn max_count(&self) -> u32 {
        self.cells.iter().map(|c| c.parcel_count).max().unwrap_or(0)
    }

    /// Cells with at least one parcel.
    pub fn occupied(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.iter().filter(|c| c.parcel_count > 0)
    }

    pub fn extent(&self) -> Option<Rect<f64>> {
        let (&x0, &x1) = (self.xs.first()?, self.xs.last()?);
        let (&y0, &y1) = (self.ys.first()?, self.ys.last()?);
        Some(Rect::new((x0, y0), (x1, y1)))
    }

    #[inline]
    pub fn cell_index(&self, row: usize, col: usize) -> usize {
        col * self.rows + row
    }
}

/// `n + 1` evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    let step = (end - start) / n as f64;
    (0..=n)
        .map(|i| if i == n { end } else { start + i as f64 * step })
        .collect()
}

/// Build an empty fishnet over `bounds` grown by `buffer` on every side.
///
/// A degenerate extent still yields at least one row and one column. Fails
/// with `InvalidConfig` when the grid would exceed [`MAX_GRID_CELLS`].
pub fn build_fishnet(bounds: Rect<f64>, cell_size: f64, buffer: f64) -> Result<Fishnet> {
    let (x0, y0) = (bounds.min().x - buffer, bounds.min().y - buffer);
    let (x1, y1) = (bounds.max().x + buffer, bounds.max().y + buffer);

    let rows = (((y1 - y0) / cell_size).ceil() as usize).max(1);
    let cols = (((x1 - x0) / cell_size).ceil() as usize).max(1);
    let n_cells = rows.checked_mul(cols).filter(|&n| n <= MAX_GRID_CELLS).ok_or_else(|| {
        MorphoError::InvalidConfig(format!(
            "cell_size_m {cell_size} gives a {cols} x {rows} grid, above the {MAX_GRID_CELLS} cell limit"
        ))
    })?;
    let xs = linspace(x0, x1, cols);
    let ys = linspace(y0, y1, rows);

    let mut cells = Vec::with_capacity(n_cells);
    for col in 0..cols {
        for row in 0..rows {
            cells.push(GridCell {
                grid_id: cells.len(),
                row,
                col,
                rect: Rect::new((xs[col], ys[row]), (xs[col + 1], ys[row + 1])),
                parcel_count: 0,
            });
        }
    }

    Ok(Fishnet { rows, cols, cell_size, xs, ys, cells })
}

/// Index range of the edge intervals `[edges[i], edges[i+1]]` that can touch
/// `[lo, hi]`. Widened by one on each side so boundary contact is tested
/// exactly rather than decided by rounding.
fn span(edges: &[f64], lo: f64, hi: f64) -> Option<(usize, usize)> {
    let n = edges.len().checked_sub(1).filter(|&n| n > 0)?;
    let (first, last) = (edges[0], edges[n]);
    if hi < first || lo > last {
        return None;
    }
    let step = (last - first) / n as f64;
    let idx = |v: f64| (((v - first) / step).floor().max(0.0) as usize).min(n - 1);
    Some((idx(lo).saturating_sub(1), (idx(hi) + 1).min(n - 1)))
}

fn touches_cell(geom: &MultiPolygon<f64>, cell: &Rect<f64>) -> bool {
    let cell = cell.to_polygon();
    geom.iter().any(|poly| poly.intersects(&cell))
}

/// Count, for every cell, the parcels whose polygon intersects it.
///
/// A parcel spanning several cells is counted once in each. Candidate cells
/// come from the parcel's bounding box; the exact polygon test decides.
pub fn count_parcels(grid: &mut Fishnet, set: &ParcelSet) {
    for cell in &mut grid.cells {
        cell.parcel_count = 0;
    }

    let mut hits = 0usize;
    for geom in set.parcels.iter().filter_map(|p| p.geometry.as_ref()) {
        let Some(bbox) = geom.bounding_rect() else { continue };
        let Some((c0, c1)) = span(&grid.xs, bbox.min().x, bbox.max().x) else { continue };
        let Some((r0, r1)) = span(&grid.ys, bbox.min().y, bbox.max().y) else { continue };

        for col in c0..=c1 {
            for row in r0..=r1 {
                let idx = grid.cell_index(row, col);
                let cell = &mut grid.cells[idx];
                if bbox.intersects(&cell.rect) && touches_cell(geom, &cell.rect) {
                    cell.parcel_count += 1;
                    hits += 1;
                }
            }
        }
    }

    info!(
        cells = grid.cells.len(),
        occupied = grid.occupied().count(),
        hits,
        max = grid.max_count(),
        "fishnet density computed"
    );
}

/// Build the fishnet over a layer and count its parcels. `Ok(None)` for a
/// layer without geometry.
pub fn parcel_density(set: &ParcelSet, cell_size: f64, buffer: f64) -> Result<Option<Fishnet>> {
    let Some(bounds) = set.total_bounds() else { return Ok(None) };
    let mut grid = build_fishnet(bounds, cell_size, buffer)?;
    count_parcels(&mut grid, set);
    Ok(Some(grid))
}
