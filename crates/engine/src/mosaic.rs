//! Uniform grid access over one or many flow-direction tiles
//!
//! The traversal engine addresses cells through a [`Mosaic`] and never
//! learns whether it runs on a single whole-domain raster or a stitched set
//! of per-watershed tiles. `contributors` is the one operation that hides
//! the tiling: an off-tile Moore neighbor is resolved geographically into
//! whichever loaded tile covers it, and a neighbor that falls only into a
//! declared-but-unloaded tile surfaces `MissingAdjacentTile` instead of
//! being skipped (skipping would silently truncate the watershed).

use crate::tile::{CellAddress, FlowTile, TileCatalog, TileId};
use basin_core::d8;
use basin_core::error::{Error, Result};
use std::sync::Arc;

const CELL_SIZE_TOL: f64 = 1e-9;

/// Read-only view over the tiles loaded for one delineation run.
pub struct Mosaic<'a> {
    catalog: &'a TileCatalog,
    tiles: Vec<Arc<FlowTile>>,
}

impl<'a> Mosaic<'a> {
    pub fn new(catalog: &'a TileCatalog) -> Self {
        Self {
            catalog,
            tiles: Vec::new(),
        }
    }

    /// Register a loaded tile.
    ///
    /// Validates geometric consistency against every already-loaded tile:
    /// identical cell size, grid alignment (origin offsets that are whole
    /// multiples of the cell size) and an agreeing CRS where both tiles
    /// carry one. A mismatch is a fatal configuration
    /// error; discovering it mid-traversal would mean the cross-tile
    /// neighbor arithmetic was never sound.
    pub fn insert(&mut self, tile: Arc<FlowTile>) -> Result<()> {
        if self.is_loaded(tile.id()) {
            return Ok(());
        }

        for loaded in &self.tiles {
            check_alignment(loaded, &tile)?;
        }

        self.tiles.push(tile);
        Ok(())
    }

    pub fn is_loaded(&self, id: &TileId) -> bool {
        self.tiles.iter().any(|t| t.id() == id)
    }

    pub fn tile(&self, id: &TileId) -> Result<&FlowTile> {
        self.tiles
            .iter()
            .find(|t| t.id() == id)
            .map(|t| t.as_ref())
            .ok_or_else(|| Error::MissingAdjacentTile {
                tile: id.to_string(),
            })
    }

    /// Resolve a geographic coordinate to a cell address.
    ///
    /// Tiles are checked in insertion order, so a point on a shared tile
    /// edge resolves deterministically to the earliest-loaded tile.
    pub fn locate(&self, x: f64, y: f64) -> Result<CellAddress> {
        for tile in &self.tiles {
            let grid = tile.directions();
            let (col, row) = grid.geo_to_pixel(x, y);
            if col >= 0.0
                && row >= 0.0
                && (col as usize) < grid.cols()
                && (row as usize) < grid.rows()
            {
                return Ok(CellAddress::new(
                    tile.id().clone(),
                    row as usize,
                    col as usize,
                ));
            }
        }

        Err(Error::OutOfBounds { x, y })
    }

    /// D8 code of the cell.
    pub fn direction(&self, addr: &CellAddress) -> Result<u8> {
        self.tile(&addr.tile)?.directions().get(addr.row, addr.col)
    }

    /// Flow-accumulation value, if an accumulation layer was supplied and
    /// the cell holds valid data.
    pub fn accumulation(&self, addr: &CellAddress) -> Result<Option<f64>> {
        let tile = self.tile(&addr.tile)?;
        match tile.accumulation() {
            None => Ok(None),
            Some(acc) => {
                let value = acc.get(addr.row, addr.col)?;
                Ok((!acc.is_nodata(value)).then_some(value))
            }
        }
    }

    /// Geographic coordinates of the cell center.
    pub fn cell_center(&self, addr: &CellAddress) -> Result<(f64, f64)> {
        let tile = self.tile(&addr.tile)?;
        Ok(tile.directions().pixel_to_geo(addr.col, addr.row))
    }

    /// Every Moore neighbor of `addr` whose direction code drains into it,
    /// across tile boundaries where necessary.
    ///
    /// Neighbors outside every declared tile are domain edges and are
    /// skipped; neighbors inside a declared but unloaded tile abort with
    /// `MissingAdjacentTile` naming the tile the coordinator must load.
    pub fn contributors(&self, addr: &CellAddress) -> Result<Vec<CellAddress>> {
        let tile = self.tile(&addr.tile)?;
        let grid = tile.directions();
        let (rows, cols) = grid.shape();

        let mut found = Vec::new();

        for &(dr, dc) in &d8::NEIGHBOR_OFFSETS {
            let nr = addr.row as isize + dr;
            let nc = addr.col as isize + dc;

            let neighbor = if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
                CellAddress::new(addr.tile.clone(), nr as usize, nc as usize)
            } else {
                // Off this tile: resolve the neighbor's center geographically.
                let (x, y) = signed_cell_center(grid.transform(), nr, nc);
                match self.locate(x, y) {
                    Ok(other) => other,
                    Err(Error::OutOfBounds { .. }) => {
                        if let Some(id) = self.declared_unloaded(x, y) {
                            return Err(Error::MissingAdjacentTile {
                                tile: id.to_string(),
                            });
                        }
                        // Declared tile is loaded but its raster does not
                        // actually cover the point (boundary polygons are
                        // only approximate), or the point is outside the
                        // whole domain: a grid edge either way.
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            let code = self.direction(&neighbor)?;
            if d8::inbound_code(dr, dc) == Some(code) {
                found.push(neighbor);
            }
        }

        Ok(found)
    }

    /// The declared tile covering the point, when that tile is not loaded.
    pub fn declared_unloaded(&self, x: f64, y: f64) -> Option<&TileId> {
        self.catalog
            .tile_containing(x, y)
            .filter(|id| !self.is_loaded(id))
    }

    /// Shape of a tile's grid, used to size visited masks.
    pub fn tile_shape(&self, id: &TileId) -> Result<(usize, usize)> {
        Ok(self.tile(id)?.directions().shape())
    }

    pub fn loaded_count(&self) -> usize {
        self.tiles.len()
    }
}

/// Cell-center coordinates allowing indices outside the raster extent.
pub(crate) fn signed_cell_center(
    gt: &basin_core::raster::GeoTransform,
    row: isize,
    col: isize,
) -> (f64, f64) {
    let col_f = col as f64 + 0.5;
    let row_f = row as f64 + 0.5;
    let x = gt.origin_x + col_f * gt.pixel_width + row_f * gt.row_rotation;
    let y = gt.origin_y + col_f * gt.col_rotation + row_f * gt.pixel_height;
    (x, y)
}

fn check_alignment(a: &FlowTile, b: &FlowTile) -> Result<()> {
    let ga = a.directions().transform();
    let gb = b.directions().transform();

    if (ga.pixel_width - gb.pixel_width).abs() > CELL_SIZE_TOL
        || (ga.pixel_height - gb.pixel_height).abs() > CELL_SIZE_TOL
    {
        return Err(Error::TileGeometryMismatch {
            a: a.id().to_string(),
            b: b.id().to_string(),
            reason: format!(
                "cell sizes differ: ({}, {}) vs ({}, {})",
                ga.pixel_width, ga.pixel_height, gb.pixel_width, gb.pixel_height
            ),
        });
    }

    let dx = (ga.origin_x - gb.origin_x) / ga.pixel_width;
    let dy = (ga.origin_y - gb.origin_y) / ga.pixel_height;
    if (dx - dx.round()).abs() > 1e-6 || (dy - dy.round()).abs() > 1e-6 {
        return Err(Error::TileGeometryMismatch {
            a: a.id().to_string(),
            b: b.id().to_string(),
            reason: "grids are not aligned to a common lattice".into(),
        });
    }

    // A tile without georeferencing keys passes; two tiles that both carry
    // a CRS must agree on it.
    if let (Some(ca), Some(cb)) = (a.directions().crs(), b.directions().crs()) {
        if ca != cb {
            return Err(Error::TileGeometryMismatch {
                a: a.id().to_string(),
                b: b.id().to_string(),
                reason: format!("CRS differ: {} vs {}", ca, cb),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_core::raster::{GeoTransform, Raster};

    /// 3x3 tile at the given origin where every cell flows east.
    fn east_tile(id: &str, origin_x: f64) -> Arc<FlowTile> {
        let mut grid: Raster<u8> = Raster::filled(3, 3, 1);
        grid.set_transform(GeoTransform::new(origin_x, 3.0, 1.0, -1.0));
        Arc::new(FlowTile::new(TileId::new(id), grid, None).unwrap())
    }

    fn catalog_two_tiles() -> TileCatalog {
        let mut catalog = TileCatalog::new();
        catalog.push_rect(TileId::new("left"), (0.0, 0.0, 3.0, 3.0));
        catalog.push_rect(TileId::new("right"), (3.0, 0.0, 6.0, 3.0));
        catalog
    }

    #[test]
    fn test_locate_across_tiles() {
        let catalog = catalog_two_tiles();
        let mut mosaic = Mosaic::new(&catalog);
        mosaic.insert(east_tile("left", 0.0)).unwrap();
        mosaic.insert(east_tile("right", 3.0)).unwrap();

        let a = mosaic.locate(0.5, 2.5).unwrap();
        assert_eq!(a.tile.as_str(), "left");
        assert_eq!((a.row, a.col), (0, 0));

        let b = mosaic.locate(3.5, 0.5).unwrap();
        assert_eq!(b.tile.as_str(), "right");
        assert_eq!((b.row, b.col), (2, 0));

        assert!(matches!(
            mosaic.locate(10.0, 10.0),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_contributors_cross_boundary() {
        let catalog = catalog_two_tiles();
        let mut mosaic = Mosaic::new(&catalog);
        mosaic.insert(east_tile("left", 0.0)).unwrap();
        mosaic.insert(east_tile("right", 3.0)).unwrap();

        // Left-edge cell of the right tile: the left tile's boundary-column
        // cell at the same row flows east into it.
        let addr = CellAddress::new(TileId::new("right"), 1, 0);
        let found = mosaic.contributors(&addr).unwrap();

        assert!(found.contains(&CellAddress::new(TileId::new("left"), 1, 2)));
    }

    #[test]
    fn test_missing_adjacent_tile_is_reported() {
        let catalog = catalog_two_tiles();
        let mut mosaic = Mosaic::new(&catalog);
        mosaic.insert(east_tile("right", 3.0)).unwrap();

        let addr = CellAddress::new(TileId::new("right"), 1, 0);
        match mosaic.contributors(&addr) {
            Err(Error::MissingAdjacentTile { tile }) => assert_eq!(tile, "left"),
            other => panic!("expected MissingAdjacentTile, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_domain_edge_is_skipped() {
        let mut catalog = TileCatalog::new();
        catalog.push_rect(TileId::new("only"), (0.0, 0.0, 3.0, 3.0));
        let mut mosaic = Mosaic::new(&catalog);
        mosaic.insert(east_tile("only", 0.0)).unwrap();

        // West edge of the only tile: no neighbor beyond, no error.
        let addr = CellAddress::new(TileId::new("only"), 1, 0);
        let found = mosaic.contributors(&addr).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_misaligned_tiles_rejected() {
        let catalog = catalog_two_tiles();
        let mut mosaic = Mosaic::new(&catalog);
        mosaic.insert(east_tile("left", 0.0)).unwrap();

        // Offset by half a cell
        let err = mosaic.insert(east_tile("right", 3.4));
        assert!(matches!(err, Err(Error::TileGeometryMismatch { .. })));
    }

    #[test]
    fn test_mismatched_crs_rejected() {
        use basin_core::CRS;

        let catalog = catalog_two_tiles();
        let mut mosaic = Mosaic::new(&catalog);

        let mut a: Raster<u8> = Raster::filled(3, 3, 1);
        a.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        a.set_crs(Some(CRS::wgs84()));
        mosaic
            .insert(Arc::new(FlowTile::new(TileId::new("left"), a, None).unwrap()))
            .unwrap();

        let mut b: Raster<u8> = Raster::filled(3, 3, 1);
        b.set_transform(GeoTransform::new(3.0, 3.0, 1.0, -1.0));
        b.set_crs(Some(CRS::from_epsg(32719)));

        assert!(matches!(
            mosaic.insert(Arc::new(
                FlowTile::new(TileId::new("right"), b, None).unwrap()
            )),
            Err(Error::TileGeometryMismatch { .. })
        ));
    }

    #[test]
    fn test_mismatched_resolution_rejected() {
        let catalog = catalog_two_tiles();
        let mut mosaic = Mosaic::new(&catalog);
        mosaic.insert(east_tile("left", 0.0)).unwrap();

        let mut grid: Raster<u8> = Raster::filled(3, 3, 1);
        grid.set_transform(GeoTransform::new(3.0, 3.0, 0.5, -0.5));
        let coarse = Arc::new(FlowTile::new(TileId::new("right"), grid, None).unwrap());

        assert!(matches!(
            mosaic.insert(coarse),
            Err(Error::TileGeometryMismatch { .. })
        ));
    }
}
