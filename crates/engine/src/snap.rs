//! Pour-point snapping
//!
//! Outlet coordinates are usually digitized off the stream line the flow
//! grid actually carves, so tracing straight from the raw coordinate yields
//! a one-cell "watershed". Snapping moves the point to the cell with the
//! highest flow accumulation inside a square search window before tracing.

use crate::mosaic::Mosaic;
use crate::tile::CellAddress;
use basin_core::error::{Error, Result};
use basin_core::geodesy;

/// An outlet to delineate, in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PourPoint {
    pub id: String,
    pub name: String,
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
    /// Declared basin area in km², used for the report's change rate.
    pub declared_area_km2: Option<f64>,
}

/// A pour point resolved onto the grid.
#[derive(Debug, Clone)]
pub struct SnappedPoint {
    pub address: CellAddress,
    /// Cell-center coordinates of the snapped cell
    pub x: f64,
    pub y: f64,
    /// Straight-line offset from the input coordinate, in degrees
    pub shift_deg: f64,
    /// Great-circle offset from the input coordinate, in meters
    pub shift_m: f64,
    /// Accumulation at the snapped cell, when a layer was available
    pub accumulation: Option<f64>,
}

/// Snap `point` to the highest-accumulation cell within `radius` cells.
///
/// The window is scanned in row-major order; ties on accumulation go to the
/// cell nearest the raw input coordinate, and a remaining tie to the earlier
/// cell in scan order, so the result is fully deterministic. With `radius` 0 or
/// no accumulation layer the point resolves to the cell it falls in.
pub fn resolve(mosaic: &Mosaic<'_>, point: &PourPoint, radius: usize) -> Result<SnappedPoint> {
    let anchor = mosaic.locate(point.x, point.y)?;

    let candidate = if radius == 0 {
        anchor.clone()
    } else {
        match best_in_window(mosaic, &anchor, point, radius)? {
            Some(addr) => addr,
            None => {
                // A window with an accumulation layer but no valid value in
                // it means the point sits in a nodata hole.
                if has_accumulation_layer(mosaic, &anchor)? {
                    return Err(Error::UnresolvedPourPoint {
                        id: point.id.clone(),
                        reason: format!(
                            "no valid accumulation within {} cells of ({}, {})",
                            radius, point.x, point.y
                        ),
                    });
                }
                anchor.clone()
            }
        }
    };

    let (x, y) = mosaic.cell_center(&candidate)?;
    let shift_deg = ((x - point.x).powi(2) + (y - point.y).powi(2)).sqrt();
    let shift_m = geodesy::haversine_distance(point.y, point.x, y, x);

    Ok(SnappedPoint {
        accumulation: mosaic.accumulation(&candidate)?,
        address: candidate,
        x,
        y,
        shift_deg,
        shift_m,
    })
}

fn has_accumulation_layer(mosaic: &Mosaic<'_>, anchor: &CellAddress) -> Result<bool> {
    Ok(mosaic.tile(&anchor.tile)?.accumulation().is_some())
}

/// Row-major scan of the (2r+1)² window centered on `anchor`.
///
/// Ties on accumulation break by squared distance from the candidate's
/// center to the raw input coordinate, then by scan order.
fn best_in_window(
    mosaic: &Mosaic<'_>,
    anchor: &CellAddress,
    point: &PourPoint,
    radius: usize,
) -> Result<Option<CellAddress>> {
    let tile = mosaic.tile(&anchor.tile)?;
    if tile.accumulation().is_none() {
        return Ok(None);
    }
    let grid = tile.directions();
    let (rows, cols) = grid.shape();
    let r = radius as isize;

    let mut best: Option<(CellAddress, f64, f64)> = None;

    for dr in -r..=r {
        for dc in -r..=r {
            let nr = anchor.row as isize + dr;
            let nc = anchor.col as isize + dc;

            let addr = if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
                CellAddress::new(anchor.tile.clone(), nr as usize, nc as usize)
            } else {
                // The window can spill into a neighboring tile.
                let (x, y) = crate::mosaic::signed_cell_center(grid.transform(), nr, nc);
                match mosaic.locate(x, y) {
                    Ok(other) => other,
                    Err(Error::OutOfBounds { .. }) => {
                        if let Some(id) = mosaic.declared_unloaded(x, y) {
                            return Err(Error::MissingAdjacentTile {
                                tile: id.to_string(),
                            });
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            let Some(acc) = mosaic.accumulation(&addr)? else {
                continue;
            };
            // Tiles share one lattice, so the anchor grid's arithmetic gives
            // the right center even for cross-tile candidates.
            let (cx, cy) = crate::mosaic::signed_cell_center(grid.transform(), nr, nc);
            let dist = (cx - point.x).powi(2) + (cy - point.y).powi(2);

            let better = match &best {
                None => true,
                Some((_, best_acc, best_dist)) => {
                    acc > *best_acc || (acc == *best_acc && dist < *best_dist)
                }
            };
            if better {
                best = Some((addr, acc, dist));
            }
        }
    }

    Ok(best.map(|(addr, _, _)| addr))
}
