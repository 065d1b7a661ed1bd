//! The `delineate` command
//!
//! Wires configuration, outlet list and tile sources into the engine, then
//! writes one boundary/mask pair per watershed, the clipped rivers, and a
//! timestamped run report.

use crate::config::{Mode, RunConfig};
use crate::outlets;
use crate::report::{self, ReportRow};
use crate::source::{DirectoryTileSource, SingleFileSource};
use anyhow::{Context, Result};
use basin_core::io::write_geotiff_u8;
use basin_core::vector::geojson;
use basin_core::vector::{AttributeValue, Feature, FeatureCollection};
use basin_engine::{
    BatchParams, ClipStatus, Delineation, Delineator, PointOutcome, PourPoint, RiverFilter,
    TileId, TileSource,
};
use geo_types::Geometry;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{info, warn};

pub fn run(config: RunConfig) -> Result<()> {
    let points = outlets::read_outlets(&config.outlets)?;
    info!(points = points.len(), mode = ?config.mode, "outlets loaded");

    let params = BatchParams {
        snap_radius: config.snap_radius,
        max_tile_loads: config.max_tile_loads,
        river_filter: config.rivers.as_ref().map(|_| RiverFilter {
            field: config.strahler_field.clone(),
            min_order: config.min_strahler,
        }),
    };

    let rows = match config.mode {
        Mode::Single => run_single(&config, &points, params)?,
        Mode::Partial => run_partial(&config, &points, params)?,
    };

    let report_path = report::report_path(&config.results);
    report::write_report(&report_path, &rows)?;

    let failed = rows.iter().filter(|r| r.status == "failed").count();
    info!(
        delineated = rows.len() - failed,
        failed,
        report = %report_path.display(),
        "run complete"
    );
    Ok(())
}

fn run_single(config: &RunConfig, points: &[PourPoint], params: BatchParams) -> Result<Vec<ReportRow>> {
    let source = SingleFileSource::open(
        &config.drainage_direction,
        config.flow_accumulation.as_deref(),
    )?;

    let rivers = config
        .rivers
        .as_ref()
        .map(|path| geojson::read_feature_collection(path))
        .transpose()
        .context("cannot read river network")?;

    let delineator = Delineator::new(source, params);
    let bar = progress_bar(points.len());

    let batch = delineator.run(points, rivers.as_ref());
    bar.inc(points.len() as u64);
    bar.finish_and_clear();

    let mut rows = Vec::with_capacity(points.len());
    for outcome in &batch.outcomes {
        if let PointOutcome::Delineated(d) = outcome {
            write_outputs(config, d)?;
        }
        rows.push(ReportRow::from_outcome(outcome));
    }
    Ok(rows)
}

fn run_partial(config: &RunConfig, points: &[PourPoint], params: BatchParams) -> Result<Vec<ReportRow>> {
    let watersheds = config
        .watersheds
        .as_ref()
        .context("partial mode requires a watersheds boundary layer")?;
    let source = DirectoryTileSource::open(
        watersheds,
        &config.watershed_field,
        &config.drainage_direction,
        config.flow_accumulation.as_deref(),
    )?;

    // Points are processed per home watershed, the way the result layers
    // are organized on disk; a point outside every boundary is reported,
    // not dropped.
    let mut groups: Vec<(TileId, Vec<PourPoint>)> = Vec::new();
    let mut rows = Vec::with_capacity(points.len());
    for point in points {
        match source.catalog().tile_containing(point.x, point.y) {
            Some(id) => match groups.iter_mut().find(|(gid, _)| gid == id) {
                Some((_, members)) => members.push(point.clone()),
                None => groups.push((id.clone(), vec![point.clone()])),
            },
            None => {
                warn!(id = %point.id, "point is outside every declared watershed");
                rows.push(ReportRow::skipped(
                    point,
                    "point is outside every declared watershed",
                ));
            }
        }
    }

    let delineator = Delineator::new(source, params);
    let bar = progress_bar(points.len());

    for (watershed, members) in &groups {
        info!(watershed = %watershed, points = members.len(), "delineating watershed group");

        let rivers = config.rivers.as_ref().and_then(|dir| {
            let path = dir.join(format!("{}.geojson", watershed));
            match geojson::read_feature_collection(&path) {
                Ok(layer) => Some(layer),
                Err(e) => {
                    warn!(watershed = %watershed, error = %e, "river layer unavailable, skipping clip");
                    None
                }
            }
        });

        let batch = delineator.run(members, rivers.as_ref());
        for outcome in &batch.outcomes {
            if let PointOutcome::Delineated(d) = outcome {
                write_outputs(config, d)?;
            }
            rows.push(ReportRow::from_outcome(outcome));
        }
        bar.inc(members.len() as u64);
    }
    bar.finish_and_clear();

    Ok(rows)
}

/// Boundary polygon, watershed mask and clipped rivers for one point.
fn write_outputs(config: &RunConfig, result: &Delineation) -> Result<()> {
    let boundary_path = config
        .watershed_dir()
        .join(format!("{}_catchment.geojson", result.point.id));
    write_boundary(result, &boundary_path)?;

    let mask_path = config
        .watershed_dir()
        .join(format!("{}_mask.tif", result.point.id));
    write_geotiff_u8(&result.mask, &mask_path)
        .with_context(|| format!("cannot write mask {}", mask_path.display()))?;

    if let Some((reaches, feedback)) = &result.rivers {
        if feedback.status == ClipStatus::Clipped {
            let river_path = config
                .river_dir()
                .join(format!("{}_river.geojson", result.point.id));
            geojson::write_feature_collection(reaches, &river_path)
                .with_context(|| format!("cannot write rivers {}", river_path.display()))?;
        }
    }

    Ok(())
}

fn write_boundary(result: &Delineation, path: &Path) -> Result<()> {
    let mut feature = Feature::new(Geometry::Polygon(result.boundary.clone()));
    feature.id = Some(result.point.id.clone());
    feature.set_property("id", AttributeValue::String(result.point.id.clone()));
    feature.set_property("name", AttributeValue::String(result.point.name.clone()));
    feature.set_property(
        "CalculatedArea[km2]",
        AttributeValue::Float(result.area_km2),
    );

    let mut collection = FeatureCollection::new();
    collection.push(feature);
    geojson::write_feature_collection(&collection, path)
        .with_context(|| format!("cannot write boundary {}", path.display()))
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} outlets {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
