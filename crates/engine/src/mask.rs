//! Watershed mask assembly
//!
//! Turns the cell set produced by the traversal into per-tile binary masks,
//! a single stitched raster clipped to the watershed's bounding box, and a
//! ground-area figure. The stitched raster is what gets polygonized and
//! written out.

use crate::mosaic::Mosaic;
use crate::tile::TileId;
use crate::trace::TraceResult;
use basin_core::error::{Error, Result};
use basin_core::geodesy;
use basin_core::raster::{GeoTransform, Raster};

/// Binary mask of one watershed over the tiles it touches.
#[derive(Debug)]
pub struct WatershedMask {
    tiles: Vec<TileMask>,
}

#[derive(Debug)]
struct TileMask {
    id: TileId,
    /// Full-tile grid, 1 inside the watershed, 0 outside
    mask: Raster<u8>,
    /// Touched window, inclusive
    min_row: usize,
    max_row: usize,
    min_col: usize,
    max_col: usize,
}

impl WatershedMask {
    /// Rasterize a trace result into per-tile masks.
    pub fn assemble(mosaic: &Mosaic<'_>, trace: &TraceResult) -> Result<Self> {
        let mut tiles: Vec<TileMask> = Vec::with_capacity(trace.tiles.len());
        for id in &trace.tiles {
            let mut mask: Raster<u8> = mosaic.tile(id)?.directions().with_same_meta();
            mask.set_nodata(Some(0));
            tiles.push(TileMask {
                id: id.clone(),
                mask,
                min_row: usize::MAX,
                max_row: 0,
                min_col: usize::MAX,
                max_col: 0,
            });
        }

        for cell in &trace.cells {
            let entry = tiles
                .iter_mut()
                .find(|t| t.id == cell.tile)
                .ok_or_else(|| Error::Other(format!("cell in unlisted tile {}", cell.tile)))?;
            entry.mask.set(cell.row, cell.col, 1)?;
            entry.min_row = entry.min_row.min(cell.row);
            entry.max_row = entry.max_row.max(cell.row);
            entry.min_col = entry.min_col.min(cell.col);
            entry.max_col = entry.max_col.max(cell.col);
        }

        Ok(Self { tiles })
    }

    pub fn cell_count(&self) -> usize {
        self.tiles
            .iter()
            .map(|t| t.mask.data().iter().filter(|&&v| v == 1).count())
            .sum()
    }

    /// The mask for one tile, if the watershed touches it.
    pub fn tile_mask(&self, id: &TileId) -> Option<&Raster<u8>> {
        self.tiles.iter().find(|t| &t.id == id).map(|t| &t.mask)
    }

    pub fn tile_ids(&self) -> impl Iterator<Item = &TileId> {
        self.tiles.iter().map(|t| &t.id)
    }

    /// One raster covering the watershed's bounding box across all touched
    /// tiles, on the shared lattice, 1 inside and 0 outside.
    pub fn stitched(&self) -> Result<Raster<u8>> {
        let windows = self
            .tiles
            .iter()
            .map(|t| t.mask.window(t.min_row, t.min_col, t.max_row + 1, t.max_col + 1))
            .collect::<Result<Vec<_>>>()?;

        let first = windows
            .first()
            .ok_or_else(|| Error::Other("empty watershed mask".into()))?;
        let gt = *first.transform();

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for win in &windows {
            let (x0, y0, x1, y1) = win.bounds();
            min_x = min_x.min(x0);
            min_y = min_y.min(y0);
            max_x = max_x.max(x1);
            max_y = max_y.max(y1);
        }

        // Tiles were validated to share one lattice on insert, so the
        // bounding box is a whole number of cells.
        let cols = ((max_x - min_x) / gt.pixel_width).round() as usize;
        let rows = ((max_y - min_y) / gt.pixel_height.abs()).round() as usize;

        let mut out: Raster<u8> = Raster::new(rows, cols);
        out.set_transform(GeoTransform::new(
            min_x,
            max_y,
            gt.pixel_width,
            gt.pixel_height,
        ));
        out.set_nodata(Some(0));
        if let Some(crs) = first.crs() {
            out.set_crs(Some(crs.clone()));
        }

        for win in &windows {
            for ((row, col), &value) in win.data().indexed_iter() {
                if value != 1 {
                    continue;
                }
                let (x, y) = win.pixel_to_geo(col, row);
                let (gc, gr) = out.geo_to_pixel(x, y);
                out.set(gr as usize, gc as usize, 1)?;
            }
        }

        Ok(out)
    }

    /// Ground area of the watershed in km², summing per-cell areas so the
    /// latitude dependence of cell width is accounted for.
    pub fn area_km2(&self) -> f64 {
        let mut total = 0.0;
        for tile in &self.tiles {
            let gt = tile.mask.transform();
            let (dlon, dlat) = (gt.pixel_width, gt.pixel_height);
            for ((row, col), &value) in tile.mask.data().indexed_iter() {
                if value == 1 {
                    let (_, lat) = tile.mask.pixel_to_geo(col, row);
                    total += geodesy::cell_area_km2(lat, dlon, dlat);
                }
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{CellAddress, FlowTile, TileCatalog};
    use crate::trace;
    use std::sync::Arc;

    fn inward_3x3(origin_x: f64) -> Raster<u8> {
        // All eight border cells drain to the center sink.
        let mut r: Raster<u8> = Raster::new(3, 3);
        r.set_transform(GeoTransform::new(origin_x, 3.0, 1.0, -1.0));
        for row in 0..3usize {
            for col in 0..3usize {
                if (row, col) == (1, 1) {
                    continue;
                }
                let dr = 1isize - row as isize;
                let dc = 1isize - col as isize;
                let code = basin_core::d8::code_for_offset(dr, dc).unwrap();
                r.set(row, col, code).unwrap();
            }
        }
        r
    }

    fn traced_mask() -> WatershedMask {
        let mut catalog = TileCatalog::new();
        catalog.push_rect(TileId::new("t"), (0.0, 0.0, 3.0, 3.0));
        let mut mosaic = Mosaic::new(&catalog);
        mosaic
            .insert(Arc::new(
                FlowTile::new(TileId::new("t"), inward_3x3(0.0), None).unwrap(),
            ))
            .unwrap();

        let outlet = CellAddress::new(TileId::new("t"), 1, 1);
        let result = trace::upstream(&mosaic, &outlet).unwrap();
        WatershedMask::assemble(&mosaic, &result).unwrap()
    }

    #[test]
    fn test_mask_covers_trace() {
        let mask = traced_mask();
        assert_eq!(mask.cell_count(), 9);

        let tile = mask.tile_mask(&TileId::new("t")).unwrap();
        assert_eq!(tile.get(0, 0).unwrap(), 1);
        assert_eq!(tile.get(2, 2).unwrap(), 1);
    }

    #[test]
    fn test_stitched_extent_and_values() {
        let mask = traced_mask();
        let stitched = mask.stitched().unwrap();

        assert_eq!(stitched.shape(), (3, 3));
        assert_eq!(stitched.bounds(), (0.0, 0.0, 3.0, 3.0));
        assert!(stitched.data().iter().all(|&v| v == 1));
    }

    #[test]
    fn test_area_is_positive_and_latitude_aware() {
        let mask = traced_mask();
        let area = mask.area_km2();
        assert!(area > 0.0);

        // 9 one-degree cells near the equator: roughly 111 km on a side each.
        let per_cell = area / 9.0;
        assert!(per_cell > 10_000.0 && per_cell < 13_000.0);
    }
}
