//! Batch delineation
//!
//! Drives the full pipeline for a list of pour points: snap, trace, mask,
//! polygonize, clip. Points run in parallel; tiles are loaded once through a
//! shared cache and re-used across points. A failed point is recorded in the
//! report and never takes its siblings down with it.

use crate::clip::{self, ClipFeedback, RiverFilter};
use crate::mask::WatershedMask;
use crate::mosaic::Mosaic;
use crate::snap::{self, PourPoint, SnappedPoint};
use crate::tile::{FlowTile, TileCatalog, TileId};
use crate::trace;
use basin_core::error::{Error, Result};
use basin_core::raster::Raster;
use basin_core::vector::FeatureCollection;
use geo_types::Polygon;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Supplies flow tiles on demand.
///
/// Single-raster runs expose one tile; directory-backed runs expose one per
/// watershed file and load lazily.
pub trait TileSource: Send + Sync {
    /// Every tile the domain declares, loaded or not.
    fn catalog(&self) -> &TileCatalog;

    /// Load one declared tile from storage.
    fn load(&self, id: &TileId) -> Result<FlowTile>;
}

/// Tuning knobs for a batch run.
#[derive(Debug, Clone)]
pub struct BatchParams {
    /// Snap search radius in cells
    pub snap_radius: usize,
    /// Upper bound on tiles loaded for a single point before giving up
    pub max_tile_loads: usize,
    /// Optional stream-order filter applied when clipping rivers
    pub river_filter: Option<RiverFilter>,
}

impl Default for BatchParams {
    fn default() -> Self {
        Self {
            snap_radius: 5,
            max_tile_loads: 64,
            river_filter: None,
        }
    }
}

/// Everything produced for one successfully delineated point.
#[derive(Debug)]
pub struct Delineation {
    pub point: PourPoint,
    pub snapped: SnappedPoint,
    /// Watershed boundary in geographic coordinates
    pub boundary: Polygon<f64>,
    /// Stitched binary mask, for raster output
    pub mask: Raster<u8>,
    pub cell_count: usize,
    pub area_km2: f64,
    /// Clipped river network, when a river layer was supplied
    pub rivers: Option<(FeatureCollection, ClipFeedback)>,
}

/// Per-point result; failures carry the error without aborting the batch.
#[derive(Debug)]
pub enum PointOutcome {
    Delineated(Box<Delineation>),
    Failed { point: PourPoint, error: Error },
}

impl PointOutcome {
    pub fn point(&self) -> &PourPoint {
        match self {
            PointOutcome::Delineated(d) => &d.point,
            PointOutcome::Failed { point, .. } => point,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, PointOutcome::Delineated(_))
    }
}

/// Results for a whole batch, in input order.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<PointOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Coordinates tile loading and per-point delineation.
pub struct Delineator<S: TileSource> {
    source: S,
    params: BatchParams,
    cache: Mutex<HashMap<TileId, Arc<FlowTile>>>,
}

impl<S: TileSource> Delineator<S> {
    pub fn new(source: S, params: BatchParams) -> Self {
        Self {
            source,
            params,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Delineate every point, optionally clipping a shared river layer to
    /// each watershed.
    pub fn run(&self, points: &[PourPoint], rivers: Option<&FeatureCollection>) -> BatchReport {
        info!(points = points.len(), "starting batch delineation");

        let outcomes: Vec<PointOutcome> = points
            .par_iter()
            .map(|point| match self.delineate(point, rivers) {
                Ok(delineation) => PointOutcome::Delineated(Box::new(delineation)),
                Err(error) => {
                    warn!(id = %point.id, %error, "point failed");
                    PointOutcome::Failed {
                        point: point.clone(),
                        error,
                    }
                }
            })
            .collect();

        let report = BatchReport { outcomes };
        info!(
            ok = report.succeeded(),
            failed = report.failed(),
            "batch finished"
        );
        report
    }

    /// Full pipeline for one point.
    pub fn delineate(
        &self,
        point: &PourPoint,
        rivers: Option<&FeatureCollection>,
    ) -> Result<Delineation> {
        let catalog = self.source.catalog();
        let mut mosaic = Mosaic::new(catalog);

        let start = catalog
            .tile_containing(point.x, point.y)
            .ok_or(Error::OutOfBounds {
                x: point.x,
                y: point.y,
            })?;
        mosaic.insert(self.tile(start)?)?;

        // Snap and trace, pulling in adjacent tiles as the traversal
        // discovers it needs them.
        let (snapped, traced) = loop {
            let attempt = snap::resolve(&mosaic, point, self.params.snap_radius)
                .and_then(|snapped| {
                    let traced = trace::upstream(&mosaic, &snapped.address)?;
                    Ok((snapped, traced))
                });

            match attempt {
                Ok(result) => break result,
                Err(Error::MissingAdjacentTile { tile }) => {
                    if mosaic.loaded_count() >= self.params.max_tile_loads {
                        return Err(Error::MissingAdjacentTile { tile });
                    }
                    let id = TileId::new(&tile);
                    debug!(id = %point.id, tile = %id, "loading adjacent tile");
                    mosaic.insert(self.tile(&id)?)?;
                }
                Err(e) => return Err(e),
            }
        };

        debug!(
            id = %point.id,
            cells = traced.cell_count(),
            tiles = traced.tiles.len(),
            "trace complete"
        );

        let mask = WatershedMask::assemble(&mosaic, &traced)?;
        let stitched = mask.stitched()?;
        let boundary = crate::polygonize::polygonize(&stitched)?;

        let rivers = match rivers {
            Some(layer) => Some(clip::clip_rivers(
                layer,
                &boundary,
                self.params.river_filter.as_ref(),
            )?),
            None => None,
        };

        Ok(Delineation {
            point: point.clone(),
            cell_count: traced.cell_count(),
            area_km2: mask.area_km2(),
            snapped,
            boundary,
            mask: stitched,
            rivers,
        })
    }

    /// Load-once tile access shared by all points in the batch.
    fn tile(&self, id: &TileId) -> Result<Arc<FlowTile>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| Error::Other("tile cache poisoned".into()))?;

        if let Some(tile) = cache.get(id) {
            return Ok(Arc::clone(tile));
        }

        if !self.source.catalog().contains_id(id) {
            return Err(Error::MissingAdjacentTile {
                tile: id.to_string(),
            });
        }

        info!(tile = %id, "loading tile");
        let tile = Arc::new(self.source.load(id)?);
        cache.insert(id.clone(), Arc::clone(&tile));
        Ok(tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_core::raster::GeoTransform;

    /// In-memory source over pre-built tiles.
    struct MemorySource {
        catalog: TileCatalog,
        tiles: HashMap<TileId, Raster<u8>>,
    }

    impl TileSource for MemorySource {
        fn catalog(&self) -> &TileCatalog {
            &self.catalog
        }

        fn load(&self, id: &TileId) -> Result<FlowTile> {
            let dirs = self
                .tiles
                .get(id)
                .cloned()
                .ok_or_else(|| Error::MissingAdjacentTile {
                    tile: id.to_string(),
                })?;
            FlowTile::new(id.clone(), dirs, None)
        }
    }

    /// Two 3x5 tiles side by side; everything in the left tile flows east,
    /// the right tile drains its west column into a sink at (1, 1).
    fn two_tile_source() -> MemorySource {
        let mut left: Raster<u8> = Raster::filled(3, 5, 1);
        left.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));

        let mut right: Raster<u8> = Raster::new(3, 5);
        right.set_transform(GeoTransform::new(5.0, 3.0, 1.0, -1.0));
        for row in 0..3usize {
            let dr = 1isize - row as isize;
            let code = basin_core::d8::code_for_offset(dr.signum(), 1).unwrap();
            right.set(row, 0, code).unwrap();
        }

        let mut catalog = TileCatalog::new();
        catalog.push_rect(TileId::new("west"), (0.0, 0.0, 5.0, 3.0));
        catalog.push_rect(TileId::new("east"), (5.0, 0.0, 10.0, 3.0));

        let mut tiles = HashMap::new();
        tiles.insert(TileId::new("west"), left);
        tiles.insert(TileId::new("east"), right);
        MemorySource { catalog, tiles }
    }

    #[test]
    fn test_cross_tile_delineation_loads_adjacent_tile() {
        let delineator = Delineator::new(two_tile_source(), BatchParams::default());

        // Sink cell (1,1) of the east tile
        let point = PourPoint {
            id: "sink".into(),
            name: "sink".into(),
            x: 6.5,
            y: 1.5,
            declared_area_km2: None,
        };

        let result = delineator.delineate(&point, None).unwrap();
        // 1 sink + 3 west-column cells of the east tile + all 15 cells of
        // the west tile
        assert_eq!(result.cell_count, 19);
        assert!(result.area_km2 > 0.0);
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let delineator = Delineator::new(two_tile_source(), BatchParams::default());

        let inside = PourPoint {
            id: "ok".into(),
            name: "ok".into(),
            x: 6.5,
            y: 1.5,
            declared_area_km2: None,
        };
        let outside = PourPoint {
            id: "bad".into(),
            name: "bad".into(),
            x: 99.0,
            y: 99.0,
            declared_area_km2: None,
        };

        let report = delineator.run(&[inside, outside.clone()], None);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        // Input order is preserved
        assert!(report.outcomes[0].is_ok());
        assert_eq!(report.outcomes[1].point().id, outside.id);
    }

    #[test]
    fn test_tile_load_cap() {
        let params = BatchParams {
            max_tile_loads: 1,
            ..BatchParams::default()
        };
        let delineator = Delineator::new(two_tile_source(), params);

        let point = PourPoint {
            id: "sink".into(),
            name: "sink".into(),
            x: 6.5,
            y: 1.5,
            declared_area_km2: None,
        };

        assert!(matches!(
            delineator.delineate(&point, None),
            Err(Error::MissingAdjacentTile { .. })
        ));
    }
}
