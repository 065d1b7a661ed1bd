//! River network clipping
//!
//! Selects the reaches of a river layer that belong to a delineated
//! watershed. A reach is kept when its midpoint vertex falls inside the
//! watershed polygon, which avoids both expensive line/polygon intersection
//! and double-counting reaches that graze the boundary.

use basin_core::error::{Error, Result};
use basin_core::vector::{Feature, FeatureCollection};
use geo::Contains;
use geo_types::{Geometry, LineString, MultiLineString, Point, Polygon};

/// Keep only reaches at or above a stream order.
#[derive(Debug, Clone)]
pub struct RiverFilter {
    /// Attribute carrying the Strahler order
    pub field: String,
    pub min_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipStatus {
    Clipped,
    /// The watershed contains no reaches (common for small basins)
    Empty,
}

/// What the clip did, for the run report.
#[derive(Debug, Clone)]
pub struct ClipFeedback {
    pub status: ClipStatus,
    pub kept: usize,
    pub total: usize,
    pub message: String,
}

/// Clip `rivers` to the reaches inside `boundary`.
///
/// With a filter, every line feature must carry the order attribute;
/// a missing attribute is a data error rather than an implicit keep.
pub fn clip_rivers(
    rivers: &FeatureCollection,
    boundary: &Polygon<f64>,
    filter: Option<&RiverFilter>,
) -> Result<(FeatureCollection, ClipFeedback)> {
    let mut kept = FeatureCollection::new();
    let mut total = 0usize;

    for feature in rivers.iter() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };

        let lines: Vec<&LineString<f64>> = match geometry {
            Geometry::LineString(ls) => vec![ls],
            Geometry::MultiLineString(mls) => mls.0.iter().collect(),
            // Non-line features in a river layer are ignored
            _ => continue,
        };
        total += 1;

        if let Some(filter) = filter {
            let order = feature
                .get_property(&filter.field)
                .and_then(|v| v.as_i64())
                .ok_or_else(|| {
                    Error::InvalidParameter(format!(
                        "river feature {} has no numeric '{}' attribute",
                        feature.id.as_deref().unwrap_or("<unnamed>"),
                        filter.field
                    ))
                })?;
            if order < filter.min_order {
                continue;
            }
        }

        let inside: Vec<LineString<f64>> = lines
            .into_iter()
            .filter(|ls| midpoint(ls).is_some_and(|p| boundary.contains(&p)))
            .cloned()
            .collect();

        if inside.is_empty() {
            continue;
        }

        let mut clipped = Feature::new(if inside.len() == 1 {
            Geometry::LineString(inside.into_iter().next().ok_or_else(|| {
                Error::Other("clipped reach vanished".into())
            })?)
        } else {
            Geometry::MultiLineString(MultiLineString::new(inside))
        });
        clipped.properties = feature.properties.clone();
        clipped.id = feature.id.clone();
        kept.push(clipped);
    }

    let feedback = if kept.is_empty() {
        ClipFeedback {
            status: ClipStatus::Empty,
            kept: 0,
            total,
            message: "no river reaches inside the watershed".into(),
        }
    } else {
        ClipFeedback {
            message: format!("{} of {} reaches inside the watershed", kept.len(), total),
            status: ClipStatus::Clipped,
            kept: kept.len(),
            total,
        }
    };

    Ok((kept, feedback))
}

fn midpoint(line: &LineString<f64>) -> Option<Point<f64>> {
    let coords = &line.0;
    if coords.is_empty() {
        return None;
    }
    let mid = coords[coords.len() / 2];
    Some(Point::new(mid.x, mid.y))
}
