//! Upstream traversal
//!
//! The D8 grid is a functional graph (every cell drains to at most one
//! neighbor), so the reversed graph is a forest and a plain breadth-first
//! search from the outlet enumerates the watershed exactly once per cell.
//! BFS keeps the visit order reproducible, which in turn keeps every
//! downstream artifact (masks, polygons, reports) byte-stable across runs.

use crate::mosaic::Mosaic;
use crate::tile::{CellAddress, TileId};
use basin_core::error::Result;
use ndarray::Array2;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

/// Cells reached by tracing upstream from one outlet.
#[derive(Debug)]
pub struct TraceResult {
    /// Watershed cells in visit order, outlet first.
    pub cells: Vec<CellAddress>,
    /// Tiles the traversal entered.
    pub tiles: Vec<TileId>,
}

impl TraceResult {
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

/// Collect every cell draining to `outlet`, the outlet itself included.
///
/// An outlet whose own code is a pit or nodata still has a watershed: its
/// contributors are discovered the same way. Fails with
/// `MissingAdjacentTile` as soon as the frontier needs a declared tile that
/// is not loaded, leaving the caller to load it and retrace.
pub fn upstream(mosaic: &Mosaic<'_>, outlet: &CellAddress) -> Result<TraceResult> {
    let mut visited: HashMap<TileId, Array2<bool>> = HashMap::new();
    let mut cells = Vec::new();
    let mut tiles = Vec::new();
    let mut frontier = VecDeque::new();

    mark(mosaic, &mut visited, &mut tiles, outlet)?;
    cells.push(outlet.clone());
    frontier.push_back(outlet.clone());

    while let Some(current) = frontier.pop_front() {
        for neighbor in mosaic.contributors(&current)? {
            if mark(mosaic, &mut visited, &mut tiles, &neighbor)? {
                cells.push(neighbor.clone());
                frontier.push_back(neighbor);
            }
        }
    }

    Ok(TraceResult { cells, tiles })
}

/// Returns true if the cell had not been visited yet.
fn mark(
    mosaic: &Mosaic<'_>,
    visited: &mut HashMap<TileId, Array2<bool>>,
    tiles: &mut Vec<TileId>,
    addr: &CellAddress,
) -> Result<bool> {
    let mask = match visited.entry(addr.tile.clone()) {
        Entry::Occupied(e) => e.into_mut(),
        Entry::Vacant(e) => {
            let shape = mosaic.tile_shape(&addr.tile)?;
            tiles.push(addr.tile.clone());
            e.insert(Array2::from_elem(shape, false))
        }
    };

    if mask[(addr.row, addr.col)] {
        return Ok(false);
    }
    mask[(addr.row, addr.col)] = true;
    Ok(true)
}
