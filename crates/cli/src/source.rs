//! Tile sources backed by GeoTIFF files
//!
//! Single mode wraps one direction/accumulation raster pair as a one-tile
//! domain. Partial mode declares a tile per watershed from the boundary
//! layer and loads `<watershed>.tif` pairs on demand, so a run only reads
//! the tiles its points actually drain across.

use basin_core::error::{Error, Result};
use basin_core::io::read_geotiff;
use basin_core::raster::Raster;
use basin_core::vector::geojson;
use basin_engine::{FlowTile, TileCatalog, TileId, TileSource};
use geo_types::Geometry;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whole-domain source: one tile, read eagerly.
pub struct SingleFileSource {
    catalog: TileCatalog,
    directions: Raster<u8>,
    accumulation: Option<Raster<f64>>,
}

const SINGLE_TILE: &str = "domain";

impl SingleFileSource {
    pub fn open(direction_path: &Path, accumulation_path: Option<&Path>) -> Result<Self> {
        debug!(path = %direction_path.display(), "reading drainage direction");
        let directions: Raster<u8> = read_geotiff(direction_path)?;

        let accumulation = match accumulation_path {
            Some(path) => {
                debug!(path = %path.display(), "reading flow accumulation");
                Some(read_geotiff::<f64, _>(path)?)
            }
            None => None,
        };

        let (min_x, min_y, max_x, max_y) = directions.bounds();
        let mut catalog = TileCatalog::new();
        catalog.push_rect(TileId::new(SINGLE_TILE), (min_x, min_y, max_x, max_y));

        Ok(Self {
            catalog,
            directions,
            accumulation,
        })
    }
}

impl TileSource for SingleFileSource {
    fn catalog(&self) -> &TileCatalog {
        &self.catalog
    }

    fn load(&self, id: &TileId) -> Result<FlowTile> {
        if id.as_str() != SINGLE_TILE {
            return Err(Error::MissingAdjacentTile {
                tile: id.to_string(),
            });
        }
        FlowTile::new(
            id.clone(),
            self.directions.clone(),
            self.accumulation.clone(),
        )
    }
}

/// Partial-mode source: per-watershed tiles resolved by file name.
pub struct DirectoryTileSource {
    catalog: TileCatalog,
    direction_dir: PathBuf,
    accumulation_dir: Option<PathBuf>,
}

impl DirectoryTileSource {
    /// Declare tiles from a watershed boundary GeoJSON whose features carry
    /// the watershed name in `id_field`.
    pub fn open(
        boundaries: &Path,
        id_field: &str,
        direction_dir: &Path,
        accumulation_dir: Option<&Path>,
    ) -> Result<Self> {
        let layer = geojson::read_feature_collection(boundaries)?;
        let mut catalog = TileCatalog::new();

        for feature in layer.iter() {
            let id = feature
                .get_property(id_field)
                .and_then(|v| match v.as_str() {
                    Some(s) => Some(s.to_string()),
                    None => v.as_i64().map(|n| n.to_string()),
                })
                .ok_or_else(|| {
                    Error::InvalidParameter(format!(
                        "watershed boundary feature without '{}' attribute",
                        id_field
                    ))
                })?;

            match &feature.geometry {
                Some(Geometry::Polygon(poly)) => {
                    catalog.push(TileId::new(&id), poly.clone());
                }
                Some(Geometry::MultiPolygon(mp)) => {
                    for poly in &mp.0 {
                        catalog.push(TileId::new(&id), poly.clone());
                    }
                }
                _ => {
                    return Err(Error::InvalidParameter(format!(
                        "watershed '{}' has no polygon geometry",
                        id
                    )))
                }
            }
        }

        if catalog.is_empty() {
            return Err(Error::InvalidParameter(
                "watershed boundary layer declares no tiles".into(),
            ));
        }

        Ok(Self {
            catalog,
            direction_dir: direction_dir.to_path_buf(),
            accumulation_dir: accumulation_dir.map(Path::to_path_buf),
        })
    }
}

impl TileSource for DirectoryTileSource {
    fn catalog(&self) -> &TileCatalog {
        &self.catalog
    }

    fn load(&self, id: &TileId) -> Result<FlowTile> {
        let direction_path = self.direction_dir.join(format!("{}.tif", id));
        debug!(path = %direction_path.display(), "reading drainage direction tile");
        let directions: Raster<u8> = read_geotiff(&direction_path)?;

        let accumulation = match &self.accumulation_dir {
            Some(dir) => {
                let path = dir.join(format!("{}.tif", id));
                Some(read_geotiff::<f64, _>(&path)?)
            }
            None => None,
        };

        FlowTile::new(id.clone(), directions, accumulation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_core::io::{write_geotiff, write_geotiff_u8};
    use basin_core::raster::GeoTransform;

    fn direction_raster(origin_x: f64) -> Raster<u8> {
        let mut r: Raster<u8> = Raster::filled(3, 3, 1);
        r.set_transform(GeoTransform::new(origin_x, 3.0, 1.0, -1.0));
        r
    }

    #[test]
    fn test_single_source_declares_one_tile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dir.tif");
        write_geotiff_u8(&direction_raster(10.0), &path).unwrap();

        let source = SingleFileSource::open(&path, None).unwrap();
        assert_eq!(source.catalog().len(), 1);
        assert!(source.catalog().tile_containing(11.0, 2.0).is_some());

        let tile = source.load(&TileId::new(SINGLE_TILE)).unwrap();
        assert_eq!(tile.directions().shape(), (3, 3));
        assert!(source.load(&TileId::new("elsewhere")).is_err());
    }

    #[test]
    fn test_directory_source_loads_by_watershed_name() {
        let dir = tempfile::tempdir().unwrap();
        let directions = dir.path().join("directions");
        let accumulation = dir.path().join("accumulation");
        std::fs::create_dir_all(&directions).unwrap();
        std::fs::create_dir_all(&accumulation).unwrap();

        write_geotiff_u8(&direction_raster(0.0), directions.join("marmara.tif")).unwrap();
        let mut acc: Raster<f64> = direction_raster(0.0).with_same_meta();
        acc.set(1, 1, 42.0).unwrap();
        write_geotiff(&acc, accumulation.join("marmara.tif")).unwrap();

        let boundaries = dir.path().join("watersheds.geojson");
        std::fs::write(
            &boundaries,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"Watershed_ID":"marmara"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[3,0],[3,3],[0,3],[0,0]]]}}
            ]}"#,
        )
        .unwrap();

        let source = DirectoryTileSource::open(
            &boundaries,
            "Watershed_ID",
            &directions,
            Some(&accumulation),
        )
        .unwrap();

        assert_eq!(
            source.catalog().tile_containing(1.0, 1.0).unwrap().as_str(),
            "marmara"
        );
        let tile = source.load(&TileId::new("marmara")).unwrap();
        assert_eq!(
            tile.accumulation().unwrap().get(1, 1).unwrap(),
            42.0
        );
    }

    #[test]
    fn test_boundary_without_id_attribute_fails() {
        let dir = tempfile::tempdir().unwrap();
        let boundaries = dir.path().join("watersheds.geojson");
        std::fs::write(
            &boundaries,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
            ]}"#,
        )
        .unwrap();

        assert!(
            DirectoryTileSource::open(&boundaries, "Watershed_ID", dir.path(), None).is_err()
        );
    }
}
