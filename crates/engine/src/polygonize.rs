//! Mask-to-polygon conversion
//!
//! Traces the cell-edge boundary of a binary mask into closed rings and
//! assembles them into one polygon. The ring with the largest area becomes
//! the exterior; every other ring, holes and detached fragments alike, is
//! attached as an interior ring.

use basin_core::error::{Error, Result};
use basin_core::raster::Raster;
use geo::Area;
use geo_types::{Coord, LineString, Polygon};
use std::collections::BTreeMap;

/// Grid corner in (col, row) order; ordering makes the edge walk
/// deterministic.
type Corner = (usize, usize);

/// Trace the boundary of a 0/1 mask into a polygon in the mask's CRS.
pub fn polygonize(mask: &Raster<u8>) -> Result<Polygon<f64>> {
    let rings = trace_rings(mask)?;
    if rings.is_empty() {
        return Err(Error::Other("cannot polygonize an empty mask".into()));
    }

    let gt = mask.transform();
    let mut polygons: Vec<(f64, LineString<f64>)> = rings
        .into_iter()
        .map(|ring| {
            let coords: Vec<Coord<f64>> = ring
                .into_iter()
                .map(|(col, row)| {
                    let (x, y) = gt.pixel_to_geo_corner(col, row);
                    Coord { x, y }
                })
                .collect();
            let ls = LineString::new(coords);
            let area = Polygon::new(ls.clone(), vec![]).unsigned_area();
            (area, ls)
        })
        .collect();

    // Largest ring is the shell
    let exterior_idx = polygons
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.0.total_cmp(&b.0))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let exterior = polygons.remove(exterior_idx).1;
    let interiors = polygons.into_iter().map(|(_, ls)| ls).collect();

    Ok(Polygon::new(exterior, interiors))
}

/// Closed rings of grid corners bounding the mask's set cells.
///
/// Each boundary edge (a cell side between a set cell and an unset or
/// off-grid cell) is emitted once, directed so that walking it keeps the
/// set region on the left in grid space; chaining the edges yields closed
/// rings.
fn trace_rings(mask: &Raster<u8>) -> Result<Vec<Vec<Corner>>> {
    let (rows, cols) = mask.shape();
    let set = |r: isize, c: isize| -> bool {
        r >= 0
            && c >= 0
            && (r as usize) < rows
            && (c as usize) < cols
            && mask.data()[(r as usize, c as usize)] == 1
    };

    let mut edges: BTreeMap<Corner, Vec<Corner>> = BTreeMap::new();
    let mut push = |from: Corner, to: Corner| edges.entry(from).or_default().push(to);

    for row in 0..rows {
        for col in 0..cols {
            if mask.data()[(row, col)] != 1 {
                continue;
            }
            let (r, c) = (row as isize, col as isize);
            if !set(r - 1, c) {
                push((col, row), (col + 1, row));
            }
            if !set(r, c + 1) {
                push((col + 1, row), (col + 1, row + 1));
            }
            if !set(r + 1, c) {
                push((col + 1, row + 1), (col, row + 1));
            }
            if !set(r, c - 1) {
                push((col, row + 1), (col, row));
            }
        }
    }

    for ends in edges.values_mut() {
        ends.sort_unstable();
    }

    let mut rings = Vec::new();
    loop {
        // Lowest remaining corner starts the next ring
        let Some((&start, _)) = edges.iter().find(|(_, ends)| !ends.is_empty()) else {
            break;
        };

        let mut ring = vec![start];
        let mut current = start;
        loop {
            let ends = edges
                .get_mut(&current)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| Error::Other("open ring while tracing mask boundary".into()))?;
            let next = ends.remove(0);
            ring.push(next);
            if next == start {
                break;
            }
            current = next;
        }

        rings.push(simplify_ring(ring));
    }

    Ok(rings)
}

/// Drop corners that sit on a straight run of edges.
fn simplify_ring(ring: Vec<Corner>) -> Vec<Corner> {
    if ring.len() < 4 {
        return ring;
    }

    // Ring is closed: first == last. Work on the open form.
    let open = &ring[..ring.len() - 1];
    let n = open.len();
    let mut kept: Vec<Corner> = Vec::with_capacity(n);
    for i in 0..n {
        let prev = open[(i + n - 1) % n];
        let here = open[i];
        let next = open[(i + 1) % n];
        let straight = (prev.0 == here.0 && here.0 == next.0)
            || (prev.1 == here.1 && here.1 == next.1);
        if !straight {
            kept.push(here);
        }
    }

    if let Some(&first) = kept.first() {
        kept.push(first);
    }
    kept
}
