//! Flow-direction tiles and the tile catalog
//!
//! In whole-domain ("single") mode there is exactly one tile; in partial
//! mode each watershed has its own direction/accumulation tile pair, and the
//! catalog records which declared tile covers which part of the domain so
//! the coordinator can discover adjacent tiles on demand.

use basin_core::error::{Error, Result};
use basin_core::raster::Raster;
use geo::Intersects;
use geo_types::{Coord, Point, Polygon, Rect};
use std::fmt;
use std::sync::Arc;

/// Identifier of one raster tile (the watershed name in partial mode).
///
/// Cheap to clone; cell addresses carry one per cell during traversal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(Arc<str>);

impl TileId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TileId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Address of one cell inside the (possibly tiled) flow-direction grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub tile: TileId,
    pub row: usize,
    pub col: usize,
}

impl CellAddress {
    pub fn new(tile: TileId, row: usize, col: usize) -> Self {
        Self { tile, row, col }
    }
}

/// One loaded flow-direction tile, read-only for the duration of a run.
///
/// The optional accumulation layer must sit on exactly the same grid as the
/// direction layer; a mismatch is a configuration error, not something to
/// paper over during traversal.
#[derive(Debug)]
pub struct FlowTile {
    id: TileId,
    directions: Raster<u8>,
    accumulation: Option<Raster<f64>>,
}

impl FlowTile {
    pub fn new(
        id: TileId,
        directions: Raster<u8>,
        accumulation: Option<Raster<f64>>,
    ) -> Result<Self> {
        if let Some(acc) = &accumulation {
            if acc.shape() != directions.shape() {
                let (er, ec) = directions.shape();
                let (ar, ac) = acc.shape();
                return Err(Error::SizeMismatch { er, ec, ar, ac });
            }
            if acc.transform() != directions.transform() {
                return Err(Error::TileGeometryMismatch {
                    a: id.to_string(),
                    b: format!("{} (accumulation)", id),
                    reason: "direction and accumulation transforms differ".into(),
                });
            }
        }

        Ok(Self {
            id,
            directions,
            accumulation,
        })
    }

    pub fn id(&self) -> &TileId {
        &self.id
    }

    pub fn directions(&self) -> &Raster<u8> {
        &self.directions
    }

    pub fn accumulation(&self) -> Option<&Raster<f64>> {
        self.accumulation.as_ref()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.directions.bounds()
    }

    /// Whether the point falls inside this tile's raster extent.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (col, row) = self.directions.geo_to_pixel(x, y);
        col >= 0.0
            && row >= 0.0
            && (col as usize) < self.directions.cols()
            && (row as usize) < self.directions.rows()
    }
}

/// A declared tile: identifier plus the boundary polygon used to decide
/// which tile a coordinate belongs to before that tile is loaded.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: TileId,
    pub boundary: Polygon<f64>,
}

/// All tiles known to exist, loaded or not.
///
/// Lookup is in declaration order, which makes point-in-two-overlapping-
/// boundaries resolution deterministic.
#[derive(Debug, Clone, Default)]
pub struct TileCatalog {
    entries: Vec<CatalogEntry>,
}

impl TileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: TileId, boundary: Polygon<f64>) {
        self.entries.push(CatalogEntry { id, boundary });
    }

    /// Declare a tile with a rectangular boundary (single mode, tests).
    pub fn push_rect(&mut self, id: TileId, bounds: (f64, f64, f64, f64)) {
        let (min_x, min_y, max_x, max_y) = bounds;
        let rect = Rect::new(
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: max_y },
        );
        self.push(id, rect.to_polygon());
    }

    /// The first declared tile whose boundary covers the point.
    pub fn tile_containing(&self, x: f64, y: f64) -> Option<&TileId> {
        let point = Point::new(x, y);
        self.entries
            .iter()
            .find(|e| e.boundary.intersects(&point))
            .map(|e| &e.id)
    }

    pub fn contains_id(&self, id: &TileId) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TileId> {
        self.entries.iter().map(|e| &e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_core::raster::GeoTransform;

    fn direction_raster() -> Raster<u8> {
        let mut r = Raster::new(4, 4);
        r.set_transform(GeoTransform::new(10.0, 44.0, 0.5, -0.5));
        r
    }

    #[test]
    fn test_tile_contains() {
        let tile = FlowTile::new(TileId::new("a"), direction_raster(), None).unwrap();

        assert!(tile.contains(10.1, 43.9));
        assert!(tile.contains(11.9, 42.1));
        assert!(!tile.contains(9.9, 43.0)); // west of the tile
        assert!(!tile.contains(10.5, 44.5)); // north of the tile
    }

    #[test]
    fn test_accumulation_shape_must_match() {
        let mut acc: Raster<f64> = Raster::new(3, 4);
        acc.set_transform(GeoTransform::new(10.0, 44.0, 0.5, -0.5));

        let err = FlowTile::new(TileId::new("a"), direction_raster(), Some(acc));
        assert!(matches!(err, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_accumulation_transform_must_match() {
        let mut acc: Raster<f64> = Raster::new(4, 4);
        acc.set_transform(GeoTransform::new(10.0, 44.0, 0.25, -0.25));

        let err = FlowTile::new(TileId::new("a"), direction_raster(), Some(acc));
        assert!(matches!(err, Err(Error::TileGeometryMismatch { .. })));
    }

    #[test]
    fn test_catalog_lookup_order() {
        let mut catalog = TileCatalog::new();
        catalog.push_rect(TileId::new("west"), (0.0, 0.0, 5.0, 10.0));
        catalog.push_rect(TileId::new("east"), (5.0, 0.0, 10.0, 10.0));

        assert_eq!(catalog.tile_containing(2.0, 5.0).unwrap().as_str(), "west");
        assert_eq!(catalog.tile_containing(7.0, 5.0).unwrap().as_str(), "east");
        // Shared edge resolves to the first declared tile
        assert_eq!(catalog.tile_containing(5.0, 5.0).unwrap().as_str(), "west");
        assert!(catalog.tile_containing(20.0, 5.0).is_none());
    }
}
